//! Entity change payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to an entity. Unknown operation names are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeOperation {
    /// Entity created.
    Created,
    /// Entity updated.
    Updated,
    /// Entity deleted.
    Deleted,
    /// Any other operation name sent by the backend.
    Other(String),
}

impl ChangeOperation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &str {
        match self {
            ChangeOperation::Created => "create",
            ChangeOperation::Updated => "update",
            ChangeOperation::Deleted => "delete",
            ChangeOperation::Other(op) => op,
        }
    }
}

impl From<&str> for ChangeOperation {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "create" | "created" | "add" | "added" => ChangeOperation::Created,
            "update" | "updated" | "edit" => ChangeOperation::Updated,
            "delete" | "deleted" | "remove" | "removed" => ChangeOperation::Deleted,
            _ => ChangeOperation::Other(value.to_string()),
        }
    }
}

impl From<String> for ChangeOperation {
    fn from(value: String) -> Self {
        ChangeOperation::from(value.as_str())
    }
}

impl From<ChangeOperation> for String {
    fn from(value: ChangeOperation) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation plus the entity data the backend attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    /// The operation.
    pub operation: ChangeOperation,
    /// Entity payload; `Null` when the backend sent none.
    #[serde(default)]
    pub data: Value,
}

impl EntityChange {
    /// A change without payload.
    pub fn new(operation: ChangeOperation) -> Self {
        Self {
            operation,
            data: Value::Null,
        }
    }

    /// A change with payload.
    pub fn with_data(operation: ChangeOperation, data: Value) -> Self {
        Self { operation, data }
    }
}
