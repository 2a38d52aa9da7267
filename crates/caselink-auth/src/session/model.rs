//! Session record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The signed-in user as returned by the auth controller.
///
/// Only `email` and `role` are required; everything else the backend
/// sends is preserved in `extra` and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Login email.
    pub email: String,
    /// Role name as sent by the backend.
    pub role: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Backend identifier (numeric or string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionUser {
    /// Parse a raw user record, requiring non-empty `email` and `role`.
    pub fn from_record(record: &Value) -> Option<Self> {
        let email = record.get("email")?.as_str()?.trim();
        let role = record.get("role")?.as_str()?.trim();
        if email.is_empty() || role.is_empty() {
            return None;
        }
        serde_json::from_value(record.clone()).ok()
    }
}

/// An authenticated admin session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer access token.
    pub access_token: String,
    /// Token exchanged for a new pair when verification fails.
    pub refresh_token: Option<String>,
    /// Role the session was saved with.
    pub role: String,
    /// The signed-in user.
    pub user: SessionUser,
    /// Local expiry, fixed at save time.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the local expiry has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Change notifications published by the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// A session was saved; `generation` increases on every save.
    Saved {
        /// Monotonic save counter.
        generation: u64,
    },
    /// The session was cleared.
    Cleared,
}
