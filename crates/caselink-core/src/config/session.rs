//! Session and persistent store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound for the session lifetime and refresh lead (ten years).
pub const MAX_SESSION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Session lifetime and refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The only role allowed to hold a session (compared case-insensitively).
    #[serde(default = "default_privileged_role")]
    pub privileged_role: String,
    /// Local session lifetime in seconds, counted from the moment of saving.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Delay in seconds, counted from the moment of saving, before the
    /// background refresh fires.
    #[serde(default = "default_refresh_lead")]
    pub token_refresh_lead_seconds: u64,
    /// Persistent store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            privileged_role: default_privileged_role(),
            session_ttl_seconds: default_session_ttl(),
            token_refresh_lead_seconds: default_refresh_lead(),
            store: StoreConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Local session lifetime.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Delay before the background token refresh.
    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.token_refresh_lead_seconds)
    }
}

/// Persistent key-value store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: `"memory"` or `"file"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Path of the JSON file used by the `"file"` backend.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
        }
    }
}

fn default_privileged_role() -> String {
    "Admin".to_string()
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_refresh_lead() -> u64 {
    3000
}

fn default_backend() -> String {
    "file".to_string()
}

fn default_path() -> String {
    "data/session.json".to_string()
}
