//! Hub connection state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting
//! Connecting   --ok---------> Connected        (join admin group)
//! Connecting   --fail-------> Reconnecting     (outer retry, base * n)
//!              --fail-------> PollingFallback  (outer budget spent)
//! Connected    --drop-------> Reconnecting     (walk the schedule)
//! Reconnecting --ok---------> Connected
//!              --exhausted--> PollingFallback
//! ```
//!
//! `PollingFallback` is terminal: the manager makes no further hub
//! attempts until it is disposed and connected again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use caselink_core::error::AppError;
use caselink_core::events::{EntityChange, EventKind};
use caselink_core::result::AppResult;

use crate::dispatch::EventDispatcher;
use crate::hub::protocol::{self, HubMessage};
use crate::hub::{HubConnector, HubLink};
use crate::polling::PollingFallback;

use super::backoff::BackoffPolicy;
use super::state::{ConnectionState, ConnectionStatus};

/// Produces the access token for each connect attempt.
pub type TokenFactory = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// An entity change to broadcast to the other admin clients.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastChange {
    kind: EventKind,
    change: EntityChange,
}

impl BroadcastChange {
    /// Fails for kinds that have no broadcast method.
    pub fn new(kind: EventKind, change: EntityChange) -> AppResult<Self> {
        if protocol::broadcast_target(kind).is_none() {
            return Err(AppError::protocol(format!("{kind} changes cannot be broadcast")));
        }
        Ok(Self { kind, change })
    }

    /// The entity kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    fn into_message(self) -> Option<HubMessage> {
        let target = protocol::broadcast_target(self.kind)?;
        Some(HubMessage::new(
            target,
            vec![
                Value::String(self.change.operation.to_string()),
                self.change.data,
            ],
        ))
    }
}

/// Keeps the admin hub connected, degrading to polling when it cannot.
pub struct RealtimeConnectionManager {
    inner: Arc<Inner>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

struct Inner {
    connector: Arc<dyn HubConnector>,
    tokens: TokenFactory,
    dispatcher: EventDispatcher,
    polling: Arc<PollingFallback>,
    policy: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<HubMessage>>>,
    attempts: AtomicU32,
    /// Consecutive failed connects; reset on every successful connect.
    retry_count: AtomicU32,
    last_error: Mutex<Option<AppError>>,
}

impl std::fmt::Debug for RealtimeConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConnectionManager")
            .field("state", &self.state())
            .field("attempts", &self.connect_attempts())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

/// How serving a live link ended.
enum Served {
    Dropped,
    Cancelled,
}

/// How walking the reconnect schedule ended.
enum Reconnect {
    Connected(HubLink),
    Exhausted,
    Cancelled,
}

impl RealtimeConnectionManager {
    /// Creates a manager in `Disconnected`.
    pub fn new(
        connector: Arc<dyn HubConnector>,
        tokens: TokenFactory,
        dispatcher: EventDispatcher,
        polling: Arc<PollingFallback>,
        policy: BackoffPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                tokens,
                dispatcher,
                polling,
                policy,
                state,
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
                retry_count: AtomicU32::new(0),
                last_error: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Starts connecting in the background. No-op while running or after
    /// falling back to polling; call [`dispose`](Self::dispose) first to
    /// start over.
    pub fn connect(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            debug!(state = %self.state(), "Connection manager already started");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.inner.clone().run(cancel.clone()));
        *task = Some((cancel, handle));
    }

    /// Stops the run loop and polling, and returns to `Disconnected`.
    pub async fn dispose(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection task ended abnormally");
            }
        }
        self.inner.polling.stop();
        self.inner.set_outbound(None);
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Current user-facing status.
    pub fn status(&self) -> ConnectionStatus {
        self.state().status()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Hub connect attempts made so far.
    pub fn connect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Consecutive failed connects counted against the outer budget.
    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count.load(Ordering::SeqCst)
    }

    /// The most recent connect failure or fallback reason.
    pub fn last_error(&self) -> Option<AppError> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sends a change to the other admin clients. Fire-and-forget:
    /// failures are logged and dropped, never returned.
    pub fn broadcast(&self, change: BroadcastChange) {
        let kind = change.kind();
        let Some(message) = change.into_message() else {
            return;
        };

        let sender = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sender {
            Some(tx) => {
                if let Err(e) = tx.try_send(message) {
                    warn!(%kind, error = %e, "Broadcast failed");
                }
            }
            None => debug!(%kind, state = %self.state(), "Not connected, broadcast dropped"),
        }
    }
}

impl Drop for RealtimeConnectionManager {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.retry_count.store(0, Ordering::SeqCst);

        'outer: loop {
            self.set_state(ConnectionState::Connecting);

            let mut link = match self.attempt(&cancel).await {
                None => break,
                Some(Ok(link)) => link,
                Some(Err(e)) => {
                    let retry_count = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(retry_count, error = %e, "Hub connect failed");
                    self.record_error(e);

                    if self.policy.outer_retries_exhausted(retry_count) {
                        self.fall_back(format!(
                            "Hub unreachable after {retry_count} attempts"
                        ));
                        break;
                    }

                    self.set_state(ConnectionState::Reconnecting);
                    let delay = self.policy.outer_retry_delay(retry_count);
                    debug!(retry_count, delay_ms = delay.as_millis() as u64, "Retrying hub connect");
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            loop {
                self.on_connected(&link).await;

                match self.serve(&mut link, &cancel).await {
                    Served::Cancelled => break 'outer,
                    Served::Dropped => {}
                }

                self.set_outbound(None);
                self.set_state(ConnectionState::Reconnecting);
                warn!("Hub connection lost, reconnecting");

                link = match self.reconnect(&cancel).await {
                    Reconnect::Connected(next) => next,
                    Reconnect::Cancelled => break 'outer,
                    Reconnect::Exhausted => {
                        self.fall_back("Hub reconnect schedule exhausted".to_string());
                        break 'outer;
                    }
                };
            }
        }

        self.set_outbound(None);
        debug!("Connection loop ended");
    }

    /// One connect attempt with a fresh token. `None` if cancelled.
    async fn attempt(&self, cancel: &CancellationToken) -> Option<AppResult<HubLink>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let token = (self.tokens)();
        debug!(attempt, has_token = token.is_some(), "Connecting to hub");

        tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.connector.connect(token) => Some(result),
        }
    }

    async fn on_connected(&self, link: &HubLink) {
        self.retry_count.store(0, Ordering::SeqCst);
        self.set_outbound(Some(link.outbound.clone()));
        self.set_state(ConnectionState::Connected);
        info!("Hub connected, joining admin group");

        if let Err(e) = link.outbound.send(HubMessage::join_admin_group()).await {
            warn!(error = %e, "Failed to join admin group");
        }
    }

    async fn serve(&self, link: &mut HubLink, cancel: &CancellationToken) -> Served {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Served::Cancelled,
                msg = link.inbound.recv() => match msg {
                    Some(msg) => self.route(msg),
                    None => return Served::Dropped,
                },
            }
        }
    }

    fn route(&self, msg: HubMessage) {
        match msg.to_event() {
            Ok(Some(event)) => {
                if event.kind().is_debounced() {
                    self.dispatcher.enqueue(event);
                } else {
                    self.dispatcher.emit(&event);
                }
            }
            Ok(None) => debug!(target_name = %msg.target, "Ignoring unknown hub event"),
            Err(e) => warn!(target_name = %msg.target, error = %e, "Dropping malformed hub event"),
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Reconnect {
        let mut index = 0;
        while let Some(delay) = self.policy.reconnect_delay(index) {
            index += 1;
            debug!(attempt = index, delay_ms = delay.as_millis() as u64, "Scheduled reconnect");
            if !sleep_or_cancel(delay, cancel).await {
                return Reconnect::Cancelled;
            }

            match self.attempt(cancel).await {
                None => return Reconnect::Cancelled,
                Some(Ok(link)) => {
                    info!(attempt = index, "Hub reconnected");
                    return Reconnect::Connected(link);
                }
                Some(Err(e)) => {
                    warn!(attempt = index, error = %e, "Hub reconnect failed");
                    self.record_error(e);
                }
            }
        }
        Reconnect::Exhausted
    }

    fn fall_back(&self, reason: String) {
        warn!(reason = %reason, "Falling back to polling");
        self.record_error(AppError::retries_exhausted(reason));
        self.set_state(ConnectionState::PollingFallback);
        self.polling.start();
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<HubMessage>>) {
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = sender;
    }

    fn record_error(&self, err: AppError) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
