//! # caselink-realtime
//!
//! Live change notifications for the CaseLink admin dashboard:
//!
//! - Hub connection over WebSocket with the JSON hub protocol
//! - Reconnect schedule and outer retry budget, then polling fallback
//! - Debounced, coalesced delivery of entity changes to handlers
//! - `SyncEngine` wiring every service with explicit `init`/`dispose`

pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod hub;
pub mod polling;

pub use connection::{
    BackoffPolicy, BroadcastChange, ConnectionState, ConnectionStatus, RealtimeConnectionManager,
    TokenFactory,
};
pub use dispatch::{EventDispatcher, HandlerError, HandlerId, HandlerResult};
pub use engine::{EngineParts, SyncEngine};
pub use hub::{HubConnector, HubLink, HubMessage, WebSocketConnector};
pub use polling::{HttpVersionProbe, PollingFallback, VersionProbe, version_from_body};
