//! JSON-file store.
//!
//! The whole namespace is one flat JSON object on disk. Every mutation
//! rewrites the file through a temporary sibling and a rename, so a crash
//! leaves either the old or the new object, never a torn one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use caselink_core::error::AppError;
use caselink_core::result::AppResult;
use caselink_core::traits::KeyValueStore;

/// Key-value store persisted as a JSON object in a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Loaded lazily on first access; `None` until then.
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Create a store for `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AppResult<BTreeMap<String, String>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AppError::with_source(
                    caselink_core::ErrorKind::Storage,
                    format!("Failed to read store file {}", self.path.display()),
                    e,
                ));
            }
        };

        match serde_json::from_str(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Store file is corrupt, starting empty");
                Ok(BTreeMap::new())
            }
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;

        // A temp file left by an earlier crash keeps its old mode.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), keys = entries.len(), "Store file written");
        Ok(())
    }

    async fn with_entries<R: Send>(
        &self,
        mutate: bool,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R + Send,
    ) -> AppResult<R> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Store entries not loaded"))?;
        if !mutate {
            return Ok(f(entries));
        }

        // The cache only changes once the file does.
        let mut next = entries.clone();
        let result = f(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(result)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.with_entries(false, |e| e.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.with_entries(true, |e| {
            e.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.with_entries(true, |e| {
            e.remove(key);
        })
        .await
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        self.with_entries(false, |e| e.keys().cloned().collect()).await
    }
}
