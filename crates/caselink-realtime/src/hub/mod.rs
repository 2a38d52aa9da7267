//! Hub wire protocol and transports.

pub mod connector;
pub mod protocol;
pub mod websocket;

pub use connector::{HubConnector, HubLink};
pub use protocol::{HubFrame, HubMessage};
pub use websocket::WebSocketConnector;
