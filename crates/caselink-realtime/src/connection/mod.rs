//! Hub connection lifecycle: states, backoff, and the manager.

pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::BackoffPolicy;
pub use manager::{BroadcastChange, RealtimeConnectionManager, TokenFactory};
pub use state::{ConnectionState, ConnectionStatus};
