//! Secure key storage and the derivation service built on top of it.

use crate::address::Address;
use crate::error::TokenError;
use crate::keys::{KeyPair, RecoverableSignature};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

/// What the key is being unlocked for, shown by prompting stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub reason: Option<String>,
}

impl AccessContext {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

/// Storage for the master private key.
///
/// Every method that touches key material takes an [`AccessContext`] because a
/// platform store may put it behind an authentication prompt.
#[async_trait]
pub trait SecureKeyStore: Send + Sync {
    /// Create and store a fresh master key, replacing any existing one.
    async fn generate(&self) -> Result<Address, TokenError>;

    /// Whether a master key is present.
    async fn exists(&self) -> bool;

    /// Unlock the master key.
    async fn private_key(&self, context: &AccessContext) -> Result<KeyPair, TokenError>;

    /// Sign `payload` with the master key.
    async fn sign(
        &self,
        payload: &[u8],
        context: &AccessContext,
    ) -> Result<RecoverableSignature, TokenError> {
        self.private_key(context).await?.sign(payload)
    }

    /// Address of the master key.
    async fn address(&self, context: &AccessContext) -> Result<Address, TokenError> {
        Ok(self.private_key(context).await?.address().clone())
    }
}

/// In-memory key store.
///
/// Counts unlocks so tests can observe how often a prompt would have been shown,
/// and can be switched to deny every unlock.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: RwLock<Option<KeyPair>>,
    deny: AtomicBool,
    unlocks: AtomicUsize,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: KeyPair) -> Self {
        Self {
            key: RwLock::new(Some(key)),
            ..Self::default()
        }
    }

    /// Make every subsequent unlock fail with `AuthenticationDenied`.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Number of successful unlocks so far.
    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecureKeyStore for MemoryKeyStore {
    async fn generate(&self) -> Result<Address, TokenError> {
        let key = KeyPair::generate()?;
        let address = key.address().clone();
        *self.key.write().await = Some(key);
        Ok(address)
    }

    async fn exists(&self) -> bool {
        self.key.read().await.is_some()
    }

    async fn private_key(&self, _context: &AccessContext) -> Result<KeyPair, TokenError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(TokenError::AuthenticationDenied);
        }
        let key = self.key.read().await.clone().ok_or(TokenError::KeyNotFound)?;
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }
}

/// Key store backed by a hex private key in a file, optionally overridden by
/// an environment variable.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
    env_var: Option<String>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_var: None,
        }
    }

    /// Check `name` before reading the file.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = Some(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn env_key(&self) -> Option<String> {
        let name = self.env_var.as_deref()?;
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

#[async_trait]
impl SecureKeyStore for FileKeyStore {
    /// Write a fresh key file. Refused while the environment variable is set,
    /// since it would shadow the new file.
    async fn generate(&self) -> Result<Address, TokenError> {
        if let (Some(name), Some(_)) = (self.env_var.as_deref(), self.env_key()) {
            return Err(TokenError::KeyProvidedByEnvironment(name.to_string()));
        }
        let key = KeyPair::generate()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        key.save_to_file(&self.path)?;
        tracing::info!(address = %key.address(), path = %self.path.display(), "Generated master key");
        Ok(key.address().clone())
    }

    async fn exists(&self) -> bool {
        self.env_key().is_some() || self.path.exists()
    }

    async fn private_key(&self, _context: &AccessContext) -> Result<KeyPair, TokenError> {
        if let Some(hex_key) = self.env_key() {
            return KeyPair::from_private_key_hex(hex_key.trim());
        }
        if !self.path.exists() {
            return Err(TokenError::KeyNotFound);
        }
        KeyPair::load_from_file(&self.path).map_err(|e| match e {
            TokenError::IoError(io) => {
                TokenError::KeyStoreUnavailable(format!("{}: {io}", self.path.display()))
            }
            other => other,
        })
    }
}

/// Read-only view of a derived agent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub index: u32,
    pub address: Address,
    pub label: String,
}

/// Master key access and agent derivation.
///
/// Unlocks are serialized so at most one authentication prompt is in flight.
pub struct KeyDerivation {
    store: Arc<dyn SecureKeyStore>,
    prompt: Mutex<()>,
}

impl KeyDerivation {
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            store,
            prompt: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SecureKeyStore> {
        &self.store
    }

    /// Address of the master identity.
    pub async fn master_address(&self) -> Result<Address, TokenError> {
        let _prompt = self.prompt.lock().await;
        self.store
            .address(&AccessContext::new("Read your account address"))
            .await
    }

    /// Unlock the master key.
    pub async fn master_key(&self, context: &AccessContext) -> Result<KeyPair, TokenError> {
        let _prompt = self.prompt.lock().await;
        self.store.private_key(context).await
    }

    /// Derive the agent keypair at `index` from an unlocked master key.
    pub fn derive_agent(master: &KeyPair, index: u32) -> Result<KeyPair, TokenError> {
        master.derive_agent(index)
    }

    /// Unlock the master key and describe the agent at `index`.
    pub async fn agent_info(&self, index: u32, label: &str) -> Result<AgentInfo, TokenError> {
        let master = self
            .master_key(&AccessContext::new(format!("Derive agent {index}")))
            .await?;
        let agent = Self::derive_agent(&master, index)?;
        Ok(AgentInfo {
            index,
            address: agent.address().clone(),
            label: label.to_string(),
        })
    }

    /// Sign with an already unlocked key.
    pub fn sign(payload: &[u8], signer: &KeyPair) -> Result<RecoverableSignature, TokenError> {
        signer.sign(payload)
    }
}
