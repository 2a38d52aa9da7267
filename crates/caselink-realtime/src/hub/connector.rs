//! Transport seam between the connection manager and the hub.

use async_trait::async_trait;
use tokio::sync::mpsc;

use caselink_core::result::AppResult;

use super::protocol::HubMessage;

/// An established hub connection.
///
/// The transport stays up while both halves are alive. A closed `inbound`
/// channel means the transport dropped; dropping `outbound` closes it.
#[derive(Debug)]
pub struct HubLink {
    /// Invocations to send to the hub.
    pub outbound: mpsc::Sender<HubMessage>,
    /// Invocations received from the hub.
    pub inbound: mpsc::Receiver<HubMessage>,
}

/// Opens hub connections.
#[async_trait]
pub trait HubConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Connects and completes the protocol handshake. `access_token` is
    /// fetched fresh for every attempt.
    async fn connect(&self, access_token: Option<String>) -> AppResult<HubLink>;
}
