//! Event dispatcher: handler registry, immediate emit, debounced enqueue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use caselink_core::config::RealtimeConfig;
use caselink_core::error::AppError;
use caselink_core::events::{EventKind, SyncEvent};

use super::queue::DebounceQueue;

/// Failure reported by an event handler. Logged, never propagated.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self::new(err.to_string())
    }
}

/// Result returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A registered event callback.
pub type EventHandler = Arc<dyn Fn(&SyncEvent) -> HandlerResult + Send + Sync>;

/// Identifies a registration for [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    handler: EventHandler,
}

/// Delivers [`SyncEvent`]s to registered handlers.
///
/// Signals go out immediately through [`emit`](Self::emit). Entity changes
/// go through [`enqueue`](Self::enqueue): one timer shared by all kinds is
/// re-armed on every enqueue, and when it fires only the newest event of
/// each kind is delivered.
///
/// Cloning is cheap and shares the registry and the queue.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: DashMap<EventKind, Vec<Registration>>,
    next_id: AtomicU64,
    queue: Mutex<DebounceQueue>,
    timer: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.pending())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher with the given debounce window.
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
                queue: Mutex::new(DebounceQueue::default()),
                timer: Mutex::new(None),
                debounce,
            }),
        }
    }

    /// Creates a dispatcher from the realtime configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.debounce_delay())
    }

    /// Registers `handler` for `kind`. Handlers for one kind run in
    /// registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&SyncEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .entry(kind)
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        debug!(%kind, handler = id.0, "Event handler registered");
        id
    }

    /// Removes a registration. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let Some(mut regs) = self.inner.handlers.get_mut(&kind) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != id);
        before != regs.len()
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner.handlers.get(&kind).map_or(0, |regs| regs.len())
    }

    /// Invokes every handler for the event's kind now. A handler that
    /// fails or panics is logged and skipped. Returns how many handlers
    /// succeeded.
    pub fn emit(&self, event: &SyncEvent) -> usize {
        self.inner.emit(event)
    }

    /// Queues an event for the next debounce flush and re-arms the timer.
    pub fn enqueue(&self, event: SyncEvent) {
        let pending = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push(event);
            queue.len()
        };

        let inner = self.inner.clone();
        let delay = self.inner.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush_queue();
        });

        let previous = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!(pending, delay_ms = delay.as_millis() as u64, "Debounce timer armed");
    }

    /// Delivers queued events now instead of waiting for the timer.
    /// Returns the number of coalesced events delivered.
    pub fn flush(&self) -> usize {
        if let Some(timer) = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            timer.abort();
        }
        self.inner.flush_queue()
    }

    /// Events waiting for the debounce window, before coalescing.
    pub fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Inner {
    fn emit(&self, event: &SyncEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may register or unregister while running.
        let regs: Vec<Registration> = match self.handlers.get(&kind) {
            Some(regs) => regs.clone(),
            None => {
                debug!(%kind, "No handlers for event");
                return 0;
            }
        };

        let mut succeeded = 0;
        for reg in &regs {
            match panic::catch_unwind(AssertUnwindSafe(|| (reg.handler)(event))) {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    warn!(%kind, handler = reg.id.0, error = %e, "Event handler failed");
                }
                Err(payload) => {
                    error!(
                        %kind,
                        handler = reg.id.0,
                        panic = panic_message(payload.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }
        succeeded
    }

    fn flush_queue(&self) -> usize {
        let batch = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain_coalesced();
        if batch.is_empty() {
            return 0;
        }

        debug!(events = batch.len(), "Flushing debounced events");
        for queued in &batch {
            self.emit(&queued.event);
        }
        batch.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
