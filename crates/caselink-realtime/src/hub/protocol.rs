//! JSON hub protocol framing.
//!
//! Every record is a JSON document terminated by [`RECORD_SEPARATOR`].
//! A connection opens with a handshake record in each direction, after
//! which both sides exchange typed frames.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use caselink_core::error::AppError;
use caselink_core::events::{ChangeOperation, EntityChange, EventKind, SyncEvent};
use caselink_core::result::AppResult;

/// Terminates every record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// Hub method that registers the caller in the admin broadcast group.
pub const JOIN_ADMIN_GROUP: &str = "JoinAdminGroup";

#[derive(Debug, Serialize)]
struct HandshakeRequest {
    protocol: &'static str,
    version: u32,
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Wire shape shared by every frame type; unused fields are absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// A method call, in either direction.
    Invocation(HubMessage),
    /// Keepalive.
    Ping,
    /// The peer is closing the connection.
    Close {
        /// Reason supplied by the server, if the close is an error.
        error: Option<String>,
        /// Whether the server allows a reconnect.
        allow_reconnect: bool,
    },
    /// Any frame type this client does not act on.
    Other(u8),
}

/// A hub method call: a target name plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct HubMessage {
    /// Method name.
    pub target: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
}

impl HubMessage {
    /// Creates an invocation of `target`.
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }

    /// The `JoinAdminGroup` call issued after every successful connect.
    pub fn join_admin_group() -> Self {
        Self::new(JOIN_ADMIN_GROUP, Vec::new())
    }

    /// Translates an inbound invocation into a [`SyncEvent`].
    ///
    /// Returns `Ok(None)` for targets this client does not know and
    /// `Err` when a known target carries unusable arguments.
    pub fn to_event(&self) -> AppResult<Option<SyncEvent>> {
        let Some(kind) = inbound_kind(&self.target) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::SystemStatus => SyncEvent::SystemStatusChanged {
                status: self.arguments.first().cloned().unwrap_or(Value::Null),
            },
            EventKind::DataVersion => SyncEvent::DataVersionChanged {
                version: match self.arguments.first() {
                    Some(Value::String(v)) => v.clone(),
                    Some(Value::Null) | None => {
                        return Err(AppError::protocol(format!(
                            "{} carried no version",
                            self.target
                        )));
                    }
                    Some(other) => other.to_string(),
                },
            },
            entity => {
                let change = self.entity_change()?;
                // Non-entity kinds are handled above.
                SyncEvent::entity(entity, change).ok_or_else(|| {
                    AppError::internal(format!("{entity} is not an entity event"))
                })?
            }
        };
        Ok(Some(event))
    }

    /// Entity events arrive as `(operation, data)` or as a single object
    /// carrying both.
    fn entity_change(&self) -> AppResult<EntityChange> {
        match self.arguments.as_slice() {
            [Value::String(op), rest @ ..] => Ok(EntityChange::with_data(
                ChangeOperation::from(op.as_str()),
                rest.first().cloned().unwrap_or(Value::Null),
            )),
            [obj @ Value::Object(_)] => serde_json::from_value(obj.clone()).map_err(|e| {
                AppError::protocol(format!("{} carried an unreadable change: {e}", self.target))
            }),
            _ => Err(AppError::protocol(format!(
                "{} expects (operation, data) arguments",
                self.target
            ))),
        }
    }
}

fn inbound_kind(target: &str) -> Option<EventKind> {
    match target {
        "UserChanged" => Some(EventKind::User),
        "RunnerChanged" => Some(EventKind::Runner),
        "AdminChanged" => Some(EventKind::Admin),
        "PublicCaseChanged" => Some(EventKind::PublicCase),
        "SystemStatusChanged" => Some(EventKind::SystemStatus),
        "DataVersionChanged" => Some(EventKind::DataVersion),
        _ => None,
    }
}

/// Outbound broadcast method for an entity kind.
pub fn broadcast_target(kind: EventKind) -> Option<&'static str> {
    match kind {
        EventKind::User => Some("BroadcastUserChange"),
        EventKind::Runner => Some("BroadcastRunnerChange"),
        EventKind::Admin => Some("BroadcastAdminChange"),
        EventKind::PublicCase => Some("BroadcastPublicCaseChange"),
        EventKind::SystemStatus | EventKind::DataVersion => None,
    }
}

/// The client handshake record, separator included.
pub fn handshake_request() -> AppResult<String> {
    let body = serde_json::to_string(&HandshakeRequest {
        protocol: PROTOCOL_NAME,
        version: PROTOCOL_VERSION,
    })?;
    Ok(format!("{body}{RECORD_SEPARATOR}"))
}

/// Checks the server's handshake response record (separator stripped).
pub fn parse_handshake_response(record: &str) -> AppResult<()> {
    let response: HandshakeResponse = serde_json::from_str(record)
        .map_err(|e| AppError::protocol(format!("Malformed handshake response: {e}")))?;
    match response.error {
        Some(error) => Err(AppError::connection(format!("Hub rejected handshake: {error}"))),
        None => Ok(()),
    }
}

/// Splits a text message into its records.
pub fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty())
}

impl HubFrame {
    /// Decodes one record (separator stripped).
    pub fn decode(record: &str) -> AppResult<Self> {
        let raw: RawFrame = serde_json::from_str(record)
            .map_err(|e| AppError::protocol(format!("Malformed hub frame: {e}")))?;

        Ok(match raw.kind {
            INVOCATION => {
                let target = raw
                    .target
                    .ok_or_else(|| AppError::protocol("Invocation frame without target"))?;
                HubFrame::Invocation(HubMessage::new(target, raw.arguments))
            }
            PING => HubFrame::Ping,
            CLOSE => HubFrame::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => HubFrame::Other(other),
        })
    }

    /// Encodes the frame as one record, separator included.
    pub fn encode(&self) -> AppResult<String> {
        let value = match self {
            HubFrame::Invocation(msg) => json!({
                "type": INVOCATION,
                "target": msg.target,
                "arguments": msg.arguments,
            }),
            HubFrame::Ping => json!({ "type": PING }),
            HubFrame::Close { error, .. } => match error {
                Some(error) => json!({ "type": CLOSE, "error": error }),
                None => json!({ "type": CLOSE }),
            },
            HubFrame::Other(kind) => {
                return Err(AppError::protocol(format!("Cannot encode frame type {kind}")));
            }
        };
        Ok(format!("{}{RECORD_SEPARATOR}", serde_json::to_string(&value)?))
    }
}
