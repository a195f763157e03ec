//! Counter and blob storage backends.

use crate::error::CredentialError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Monotonic per-device counter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Advance the counter and return the new value.
    async fn next(&self) -> Result<u64, CredentialError>;

    /// Current value without advancing.
    async fn current(&self) -> Result<u64, CredentialError>;
}

/// Opaque storage for one serialized blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Replace the stored blob.
    async fn save(&self, bytes: &[u8]) -> Result<(), CredentialError>;

    /// Load the stored blob, `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<Vec<u8>>, CredentialError>;
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// In-memory counter.
#[derive(Default)]
pub struct MemoryCounterStore {
    value: Mutex<u64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn next(&self) -> Result<u64, CredentialError> {
        let mut value = self.value.lock().await;
        *value = value
            .checked_add(1)
            .ok_or_else(|| CredentialError::CounterStoreUnavailable("counter overflow".to_string()))?;
        Ok(*value)
    }

    async fn current(&self) -> Result<u64, CredentialError> {
        Ok(*self.value.lock().await)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
    counter: u64,
}

/// Counter persisted as `{"counter": N}`.
pub struct FileCounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<u64, CredentialError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let content = std::fs::read(&self.path).map_err(|e| self.unavailable(e))?;
        let file: CounterFile =
            serde_json::from_slice(&content).map_err(|e| self.unavailable(e))?;
        Ok(file.counter)
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> CredentialError {
        CredentialError::CounterStoreUnavailable(format!("{}: {e}", self.path.display()))
    }
}

#[async_trait]
impl CounterStore for FileCounterStore {
    async fn next(&self) -> Result<u64, CredentialError> {
        let _guard = self.lock.lock().await;
        let counter = self
            .read()?
            .checked_add(1)
            .ok_or_else(|| self.unavailable("counter overflow"))?;
        let bytes = serde_json::to_vec(&CounterFile { counter })?;
        write_atomic(&self.path, &bytes).map_err(|e| self.unavailable(e))?;
        tracing::debug!(counter, "Advanced device counter");
        Ok(counter)
    }

    async fn current(&self) -> Result<u64, CredentialError> {
        let _guard = self.lock.lock().await;
        self.read()
    }
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, bytes: &[u8]) -> Result<(), CredentialError> {
        *self.blob.lock().await = Some(bytes.to_vec());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, CredentialError> {
        Ok(self.blob.lock().await.clone())
    }
}

/// Blob stored in a single file.
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn save(&self, bytes: &[u8]) -> Result<(), CredentialError> {
        write_atomic(&self.path, bytes)
            .map_err(|e| CredentialError::StorageError(format!("{}: {e}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Saved blob");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, CredentialError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CredentialError::StorageError(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}
