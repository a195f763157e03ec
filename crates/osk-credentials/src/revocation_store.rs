//! Source of truth for revocations.
//!
//! The lifecycle manager writes here; validators read immutable
//! [`RevocationSnapshot`] values taken from it.

use crate::error::CredentialError;
use crate::storage::write_atomic;
use async_trait::async_trait;
use osk_token::RevocationSnapshot;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Revoke one credential.
    async fn revoke(&self, address: &str, nonce: &str) -> Result<(), CredentialError>;

    /// Revoke everything `address` issued with a counter at or below `threshold`.
    async fn revoke_all(&self, address: &str, threshold: u64) -> Result<(), CredentialError>;

    /// Current state.
    async fn snapshot(&self) -> Result<RevocationSnapshot, CredentialError>;
}

/// In-memory revocation store.
#[derive(Default)]
pub struct MemoryRevocationStore {
    snapshot: RwLock<RevocationSnapshot>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, address: &str, nonce: &str) -> Result<(), CredentialError> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = std::mem::take(&mut *snapshot).with_revoked(address, nonce);
        Ok(())
    }

    async fn revoke_all(&self, address: &str, threshold: u64) -> Result<(), CredentialError> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = std::mem::take(&mut *snapshot).with_threshold(address, threshold);
        Ok(())
    }

    async fn snapshot(&self) -> Result<RevocationSnapshot, CredentialError> {
        Ok(self.snapshot.read().await.clone())
    }
}

/// Revocations persisted as one JSON file.
///
/// Every read goes to disk so revocations made by other processes are seen.
pub struct FileRevocationStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRevocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RevocationSnapshot, CredentialError> {
        if !self.path.exists() {
            return Ok(RevocationSnapshot::default());
        }
        let content = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    async fn update(
        &self,
        f: impl FnOnce(RevocationSnapshot) -> RevocationSnapshot + Send,
    ) -> Result<(), CredentialError> {
        let _guard = self.lock.lock().await;
        let snapshot = f(self.read()?);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&snapshot)?)?;
        tracing::debug!(
            revoked = snapshot.revoked_count(),
            thresholds = snapshot.threshold_count(),
            "Saved revocations"
        );
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for FileRevocationStore {
    async fn revoke(&self, address: &str, nonce: &str) -> Result<(), CredentialError> {
        self.update(|s| s.with_revoked(address, nonce)).await
    }

    async fn revoke_all(&self, address: &str, threshold: u64) -> Result<(), CredentialError> {
        self.update(|s| s.with_threshold(address, threshold)).await
    }

    async fn snapshot(&self) -> Result<RevocationSnapshot, CredentialError> {
        let _guard = self.lock.lock().await;
        self.read()
    }
}
