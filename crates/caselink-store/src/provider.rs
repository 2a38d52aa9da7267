//! Store manager that dispatches to the configured backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use caselink_core::config::StoreConfig;
use caselink_core::error::AppError;
use caselink_core::result::AppResult;
use caselink_core::traits::KeyValueStore;

/// Wraps the backend selected at construction time.
#[derive(Debug, Clone)]
pub struct StoreManager {
    inner: Arc<dyn KeyValueStore>,
}

impl StoreManager {
    /// Create a store manager from configuration.
    pub fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn KeyValueStore> = match config.backend.as_str() {
            #[cfg(feature = "file")]
            "file" => {
                info!(path = %config.path, "Using file session store");
                Arc::new(crate::file::FileStore::new(&config.path))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Using in-memory session store");
                Arc::new(crate::memory::MemoryStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store backend: '{other}'. Supported: file, memory"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing backend (for testing).
    pub fn from_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self { inner: store }
    }

    /// The shared backend handle.
    pub fn shared(&self) -> Arc<dyn KeyValueStore> {
        self.inner.clone()
    }
}

#[async_trait]
impl KeyValueStore for StoreManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        self.inner.keys().await
    }
}
