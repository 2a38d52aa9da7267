//! Single-flight token refresh.
//!
//! At most one verify/refresh cycle runs at a time. The first caller
//! spawns the cycle and parks a shared handle in `in_flight`; every caller
//! arriving while it runs awaits that same handle and observes the same
//! outcome. The check and the set happen under one mutex acquisition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use caselink_core::ErrorKind;

use crate::api::AuthApi;

use super::store::SessionStore;
use super::timer;

type RefreshHandle = Shared<BoxFuture<'static, bool>>;

/// Coordinates token verification and refresh for the process.
#[derive(Debug)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
    /// Cancels the refresh timer task.
    timer: Mutex<Option<CancellationToken>>,
}

struct Inner {
    session: Arc<SessionStore>,
    api: Arc<dyn AuthApi>,
    in_flight: Mutex<Option<RefreshHandle>>,
    cycles: AtomicU64,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("api", &self.api)
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Clears `in_flight` when the cycle ends, including by panic.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}

impl RefreshCoordinator {
    /// Creates a coordinator. Construct exactly one per session store.
    pub fn new(session: Arc<SessionStore>, api: Arc<dyn AuthApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                api,
                in_flight: Mutex::new(None),
                cycles: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Verifies the session, refreshing it if needed.
    ///
    /// Returns `true` when the session is usable afterwards. On `false` the
    /// session has been cleared. Never errors: network failures count as a
    /// negative answer.
    pub async fn refresh(&self) -> bool {
        self.inner.clone().join_or_start().await
    }

    /// Whether a cycle is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Number of verify/refresh cycles started so far.
    pub fn refresh_count(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    /// Starts the background refresh timer. Calling it again restarts it.
    pub fn init(&self) {
        let token = CancellationToken::new();
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let inner = self.inner.clone();
        let lead = inner.session.config().refresh_lead();
        let signals = inner.session.subscribe();
        tokio::spawn(timer::run(
            signals,
            lead,
            token,
            move || {
                let inner = inner.clone();
                async move { inner.join_or_start().await }
            },
        ));
        debug!(lead_secs = lead.as_secs(), "Refresh timer started");
    }

    /// Stops the background refresh timer. A running cycle completes.
    pub fn dispose(&self) {
        if let Some(token) = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            token.cancel();
            debug!("Refresh timer stopped");
        }
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn join_or_start(self: Arc<Self>) -> RefreshHandle {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            return existing.clone();
        }

        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = InFlightGuard(self.clone());
        let task = tokio::spawn(async move {
            let _guard = guard;
            _guard.0.run_cycle(cycle).await
        });

        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(cycle, error = %e, "Refresh task failed");
                    false
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(handle.clone());
        handle
    }

    async fn run_cycle(&self, cycle: u64) -> bool {
        // A logout while the cycle is on the network wins over its result.
        let epoch = self.session.clear_epoch();

        if let Some(token) = self.session.access_token() {
            match self.api.verify(&token).await {
                Ok(resp) if resp.success => {
                    debug!(cycle, "Access token verified");
                    return self.session.clear_epoch() == epoch;
                }
                Ok(resp) => {
                    debug!(cycle, message = ?resp.message, "Access token rejected");
                }
                Err(e) => {
                    warn!(cycle, error = %e, "Token verification failed");
                }
            }
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            info!(cycle, "No refresh token, clearing session");
            self.session.clear().await;
            return false;
        };

        let resp = match self.api.refresh(&refresh_token).await {
            Ok(resp) if resp.success => resp,
            Ok(resp) => {
                warn!(cycle, message = ?resp.message, "Refresh rejected, clearing session");
                self.session.clear().await;
                return false;
            }
            Err(e) => {
                warn!(cycle, error = %e, "Refresh failed, clearing session");
                self.session.clear().await;
                return false;
            }
        };

        let Some(token) = resp.token else {
            warn!(cycle, "Refresh response carried no token, clearing session");
            self.session.clear().await;
            return false;
        };

        let user = match resp.user {
            Some(user) => user,
            None => match self.session.snapshot() {
                Some(session) => serde_json::to_value(&session.user).unwrap_or_default(),
                None => serde_json::Value::Null,
            },
        };
        let next_refresh = resp.refresh_token.unwrap_or(refresh_token);

        match self
            .session
            .try_save_if(epoch, &token, &user, Some(&next_refresh))
            .await
        {
            Ok(()) => {
                info!(cycle, "Session refreshed");
                true
            }
            Err(e) if e.kind == ErrorKind::SessionExpired => {
                info!(cycle, "Session cleared during refresh, discarding new tokens");
                false
            }
            Err(e) => {
                warn!(cycle, kind = %e.kind, error = %e.message, "Refreshed session rejected");
                self.session.clear().await;
                false
            }
        }
    }
}
