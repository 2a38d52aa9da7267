//! Trait seams shared between crates.

pub mod store;

pub use store::KeyValueStore;
