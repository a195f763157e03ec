//! CLI command implementations for osk.
//!
//! Every command wires the file-backed collaborators described by the
//! configuration; nothing here holds state between invocations.

pub mod init;
pub mod keys;
pub mod token;

use anyhow::Context;
use osk_core::OskConfig;
use osk_credentials::{
    CredentialLifecycleManager, FileBlobStore, FileCounterStore, FileRevocationStore,
};
use osk_token::{FileKeyStore, KeyDerivation};
use std::sync::Arc;

/// Master key store for the configuration.
pub fn key_store(config: &OskConfig) -> FileKeyStore {
    let store = FileKeyStore::new(config.master_key_path());
    match &config.keys.master_key_env {
        Some(var) => store.with_env_var(var),
        None => store,
    }
}

pub fn key_derivation(config: &OskConfig) -> Arc<KeyDerivation> {
    Arc::new(KeyDerivation::new(Arc::new(key_store(config))))
}

pub fn revocation_store(config: &OskConfig) -> FileRevocationStore {
    FileRevocationStore::new(config.revocations_path())
}

/// Lifecycle manager over the configured files.
pub async fn manager(config: &OskConfig) -> anyhow::Result<CredentialLifecycleManager> {
    let manager = CredentialLifecycleManager::open(
        key_derivation(config),
        Arc::new(FileCounterStore::new(config.counter_path())),
        Arc::new(FileBlobStore::new(config.credentials_path())),
        Arc::new(revocation_store(config)),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to load credential metadata from {}",
            config.credentials_path().display()
        )
    })?;
    Ok(manager.with_agents(config.agents.clone()))
}

/// Read a token from a file if `token` names one, otherwise use it as is.
pub fn read_token(token: String) -> anyhow::Result<String> {
    let path = std::path::Path::new(&token);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token from {}", path.display()))?;
        return Ok(content.trim().to_string());
    }
    Ok(token.trim().to_string())
}
