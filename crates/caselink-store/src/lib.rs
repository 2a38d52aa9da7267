//! # caselink-store
//!
//! Backends for the persistent key-value store the session lives in.
//! Supports an in-memory map (tests, ephemeral runs) and a JSON file
//! (the default for the CLI and daemon).

pub mod keys;
#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;

#[cfg(feature = "file")]
pub use file::FileStore;
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use provider::StoreManager;
