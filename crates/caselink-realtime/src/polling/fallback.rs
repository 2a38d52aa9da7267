//! Data-version polling used once the hub is given up on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use caselink_core::events::SyncEvent;

use crate::dispatch::EventDispatcher;

use super::probe::VersionProbe;

/// Polls the data version on a fixed interval and emits
/// [`SyncEvent::DataVersionChanged`] when it moves.
#[derive(Debug)]
pub struct PollingFallback {
    inner: Arc<Inner>,
    task: Mutex<Option<CancellationToken>>,
}

#[derive(Debug)]
struct Inner {
    probe: Arc<dyn VersionProbe>,
    dispatcher: EventDispatcher,
    interval: Duration,
    last_version: Mutex<Option<String>>,
    polls: AtomicU64,
}

impl PollingFallback {
    /// Creates a stopped poller.
    pub fn new(probe: Arc<dyn VersionProbe>, dispatcher: EventDispatcher, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                probe,
                dispatcher,
                interval,
                last_version: Mutex::new(None),
                polls: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Starts polling: one poll now, then one per interval. No-op if
    /// already polling.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            debug!("Polling already running");
            return;
        }

        let cancel = CancellationToken::new();
        *task = Some(cancel.clone());

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // A poll still in flight at stop() is dropped unreported.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = inner.poll() => {}
                }
            }
            debug!("Polling loop ended");
        });

        info!(interval_secs = self.inner.interval.as_secs(), "Polling fallback started");
    }

    /// Stops polling and forgets the observed version, so the next polling
    /// session starts from a fresh baseline. No-op if not polling.
    pub fn stop(&self) {
        if let Some(cancel) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
            *self
                .inner
                .last_version
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = None;
            info!("Polling fallback stopped");
        }
    }

    /// Whether the polling loop is running.
    pub fn is_polling(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Runs one poll. Returns `true` if a change was signalled.
    pub async fn poll_once(&self) -> bool {
        self.inner.poll().await
    }

    /// The most recently observed version.
    pub fn last_version(&self) -> Option<String> {
        self.inner
            .last_version
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Polls performed so far, failed ones included.
    pub fn poll_count(&self) -> u64 {
        self.inner.polls.load(Ordering::SeqCst)
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    async fn poll(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let version = match self.probe.fetch_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "Data version poll failed");
                return false;
            }
        };

        let previous = self
            .last_version
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let changed = matches!(&previous, Some(prev) if *prev != version);
        if changed {
            info!(from = ?previous, to = %version, "Data version changed");
            self.dispatcher.emit(&SyncEvent::DataVersionChanged {
                version: version.clone(),
            });
        } else if previous.is_none() {
            debug!(version = %version, "Recorded initial data version");
        }

        *self.last_version.lock().unwrap_or_else(|e| e.into_inner()) = Some(version);
        changed
    }
}
