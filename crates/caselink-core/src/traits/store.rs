//! Persistent key-value store trait.

use async_trait::async_trait;

use crate::result::AppResult;

/// A string-keyed persistent store holding the session record.
///
/// One logical namespace; values are plain strings (JSON where the value
/// is structured). Implementations provide no cross-process locking.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key is absent.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> AppResult<()>;

    /// All keys currently present.
    async fn keys(&self) -> AppResult<Vec<String>>;

    /// Whether the store holds no keys.
    async fn is_empty(&self) -> AppResult<bool> {
        Ok(self.keys().await?.is_empty())
    }
}
