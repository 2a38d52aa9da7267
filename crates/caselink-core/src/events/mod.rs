//! Change events pushed by the admin hub or raised by polling.
//!
//! The set is closed: every inbound hub target maps onto exactly one
//! [`SyncEvent`] variant and every consumer matches exhaustively.

pub mod change;

use serde::{Deserialize, Serialize};

pub use change::{ChangeOperation, EntityChange};

/// Discriminant of a [`SyncEvent`]; handlers register per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user record changed.
    User,
    /// A runner record changed.
    Runner,
    /// An admin record changed.
    Admin,
    /// A public case changed.
    PublicCase,
    /// The backend reported a new system status.
    SystemStatus,
    /// The backend data version advanced.
    DataVersion,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::User,
        EventKind::Runner,
        EventKind::Admin,
        EventKind::PublicCase,
        EventKind::SystemStatus,
        EventKind::DataVersion,
    ];

    /// Entity kinds go through the debounce queue; signals are delivered
    /// immediately.
    pub fn is_debounced(self) -> bool {
        match self {
            EventKind::User | EventKind::Runner | EventKind::Admin | EventKind::PublicCase => true,
            EventKind::SystemStatus | EventKind::DataVersion => false,
        }
    }

    /// Short name used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::User => "user",
            EventKind::Runner => "runner",
            EventKind::Admin => "admin",
            EventKind::PublicCase => "public_case",
            EventKind::SystemStatus => "system_status",
            EventKind::DataVersion => "data_version",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification delivered to application handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// `UserChanged` from the hub.
    UserChanged(EntityChange),
    /// `RunnerChanged` from the hub.
    RunnerChanged(EntityChange),
    /// `AdminChanged` from the hub.
    AdminChanged(EntityChange),
    /// `PublicCaseChanged` from the hub.
    PublicCaseChanged(EntityChange),
    /// `SystemStatusChanged(status)` from the hub.
    SystemStatusChanged {
        /// Opaque status payload.
        status: serde_json::Value,
    },
    /// `DataVersionChanged(version)` from the hub, or a version advance
    /// observed by polling.
    DataVersionChanged {
        /// The new version token.
        version: String,
    },
}

impl SyncEvent {
    /// The handler registry key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::UserChanged(_) => EventKind::User,
            SyncEvent::RunnerChanged(_) => EventKind::Runner,
            SyncEvent::AdminChanged(_) => EventKind::Admin,
            SyncEvent::PublicCaseChanged(_) => EventKind::PublicCase,
            SyncEvent::SystemStatusChanged { .. } => EventKind::SystemStatus,
            SyncEvent::DataVersionChanged { .. } => EventKind::DataVersion,
        }
    }

    /// Builds the entity event of `kind`. Returns `None` for signal kinds.
    pub fn entity(kind: EventKind, change: EntityChange) -> Option<Self> {
        match kind {
            EventKind::User => Some(SyncEvent::UserChanged(change)),
            EventKind::Runner => Some(SyncEvent::RunnerChanged(change)),
            EventKind::Admin => Some(SyncEvent::AdminChanged(change)),
            EventKind::PublicCase => Some(SyncEvent::PublicCaseChanged(change)),
            EventKind::SystemStatus | EventKind::DataVersion => None,
        }
    }

    /// The entity change carried by this event, if any.
    pub fn change(&self) -> Option<&EntityChange> {
        match self {
            SyncEvent::UserChanged(c)
            | SyncEvent::RunnerChanged(c)
            | SyncEvent::AdminChanged(c)
            | SyncEvent::PublicCaseChanged(c) => Some(c),
            SyncEvent::SystemStatusChanged { .. } | SyncEvent::DataVersionChanged { .. } => None,
        }
    }
}
