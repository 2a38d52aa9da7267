//! # caselink-core
//!
//! Core crate for the CaseLink admin sync client. Contains configuration
//! schemas, the closed set of change events pushed by the hub, the
//! key-value store trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other CaseLink crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;

pub use error::{AppError, ErrorKind};
pub use events::{ChangeOperation, EntityChange, EventKind, SyncEvent};
pub use result::AppResult;
