//! Polling fallback configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Data-version polling used when the hub is unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between version polls.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

impl PollingConfig {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

fn default_interval() -> u64 {
    30
}
