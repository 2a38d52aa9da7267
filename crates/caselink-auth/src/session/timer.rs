//! Background refresh timer.
//!
//! Every save (re)arms a single sleep of `lead` counted from the save;
//! a clear disarms it. The delay is not anchored to the token's real
//! expiry.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::model::SessionSignal;

pub(super) async fn run<F, Fut>(
    mut signals: watch::Receiver<SessionSignal>,
    lead: Duration,
    cancel: CancellationToken,
    refresh: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    loop {
        let signal = *signals.borrow_and_update();

        match signal {
            SessionSignal::Saved { generation } => {
                debug!(generation, lead_secs = lead.as_secs(), "Refresh timer armed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = signals.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(lead) => {
                        let ok = refresh().await;
                        info!(generation, ok, "Scheduled token refresh finished");
                        if !signals.has_changed().unwrap_or(false) {
                            // Nothing new to arm for; wait for the next save or clear.
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                changed = signals.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            SessionSignal::Cleared => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = signals.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!("Refresh timer loop ended");
}
