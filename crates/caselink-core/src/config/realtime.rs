//! Hub connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time hub connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Hub endpoint. `http(s)` URLs are upgraded to `ws(s)`.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// Delays, in milliseconds, between automatic reconnect attempts after a
    /// transport drop. Applied in order; exhausting it ends hub usage.
    #[serde(default = "default_reconnect_schedule")]
    pub reconnect_schedule_ms: Vec<u64>,
    /// Number of failed initial connects before switching to polling.
    #[serde(default = "default_max_outer_retries")]
    pub max_outer_retries: u32,
    /// Base delay for initial connect retries (multiplied by the retry count).
    #[serde(default = "default_outer_retry_base_delay")]
    pub outer_retry_base_delay_ms: u64,
    /// Quiet period before queued entity changes are flushed to handlers.
    #[serde(default = "default_debounce_delay")]
    pub debounce_delay_ms: u64,
    /// Maximum wait for the hub handshake response.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
    /// Interval between keepalive pings sent to the hub.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,
    /// Buffer size of the inbound/outbound hub channels.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            reconnect_schedule_ms: default_reconnect_schedule(),
            max_outer_retries: default_max_outer_retries(),
            outer_retry_base_delay_ms: default_outer_retry_base_delay(),
            debounce_delay_ms: default_debounce_delay(),
            handshake_timeout_seconds: default_handshake_timeout(),
            keepalive_interval_seconds: default_keepalive_interval(),
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

impl RealtimeConfig {
    /// Debounce window for entity change coalescing.
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    /// Handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }
}

fn default_hub_url() -> String {
    "http://localhost:5000/hubs/admin".to_string()
}

fn default_reconnect_schedule() -> Vec<u64> {
    vec![0, 2000, 10000, 30000]
}

fn default_max_outer_retries() -> u32 {
    5
}

fn default_outer_retry_base_delay() -> u64 {
    5000
}

fn default_debounce_delay() -> u64 {
    500
}

fn default_handshake_timeout() -> u64 {
    15
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_channel_buffer() -> usize {
    256
}
