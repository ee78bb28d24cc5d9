use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable blob store: the whole value is read and written at once.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError>;
    async fn write_all(&self, blob: &[u8]) -> Result<(), StoreError>;
}

/// Stores its blob in a single file, creating parent directories on write.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.io_error(error)),
        }
    }

    async fn write_all(&self, blob: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(error))?;
        }
        // Write to a sibling file first so a crash never leaves a torn blob.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, blob)
            .await
            .map_err(|error| self.io_error(error))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|error| self.io_error(error))?;
        debug!(target: "findflix_cache", file = ?self.path, bytes = blob.len(), "wrote store blob");
        Ok(())
    }
}

/// Process-local store, mostly for tests and `--no-persist` style setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            fail_writes: false,
        }
    }

    /// A store whose writes always fail, like a browser store over quota.
    pub fn read_only(blob: Option<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(blob),
            fail_writes: true,
        }
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.blob.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .blob
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn write_all(&self, blob: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("quota exceeded".to_string()));
        }
        let mut guard = self
            .blob
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        *guard = Some(blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_reads_as_absent() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nothing.json"));
        assert!(store.read_all().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_blob_and_creates_parents() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested/cache.json"));
        store.write_all(br#"{"a":1}"#).await.unwrap();

        let reopened = FileStore::new(store.path().to_path_buf());
        assert_eq!(
            reopened.read_all().await.unwrap().as_deref(),
            Some(br#"{"a":1}"#.as_slice())
        );
        assert!(!dir.path().join("nested/cache.tmp").exists());
    }

    #[tokio::test]
    async fn read_only_memory_store_rejects_writes() {
        let store = MemoryStore::read_only(Some(b"seed".to_vec()));
        assert!(matches!(
            store.write_all(b"next").await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.read_all().await.unwrap(), Some(b"seed".to_vec()));
    }
}
