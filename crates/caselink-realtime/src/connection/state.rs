//! Connection lifecycle states.

use serde::{Deserialize, Serialize};

/// Internal state of the hub connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started, or disposed.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// The hub is connected and the admin group joined.
    Connected,
    /// Waiting for or running a retry.
    Reconnecting,
    /// Hub retries are exhausted; data is refreshed by polling.
    PollingFallback,
}

impl ConnectionState {
    /// The user-facing status for this state.
    pub fn status(self) -> ConnectionStatus {
        match self {
            ConnectionState::Connected => ConnectionStatus::Connected,
            ConnectionState::PollingFallback => ConnectionStatus::Polling,
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => ConnectionStatus::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::PollingFallback => "polling_fallback",
        };
        f.write_str(s)
    }
}

/// The three states shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Live updates are flowing.
    Connected,
    /// Updates arrive by polling.
    Polling,
    /// No updates are arriving.
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Polling => "Polling",
            ConnectionStatus::Disconnected => "Disconnected",
        };
        f.write_str(s)
    }
}
