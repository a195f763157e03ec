//! # osk-credentials
//!
//! Lifecycle management for osk API credentials.
//!
//! This crate provides functionality for:
//! - Issuing tokens signed by the master key or a derived agent key
//! - Persisting non-secret credential metadata (never the token itself)
//! - Revoking single credentials by nonce, or everything an address issued
//!   so far by counter threshold
//! - Counter, blob and revocation storage backends (in-memory and file)
//!
//! ## Persisted State
//!
//! | Store | Content | Default file |
//! |-------|---------|--------------|
//! | `CounterStore` | Monotonic device counter | `counter.json` |
//! | `BlobStore` | JSON array of `CredentialMetadata` | `credentials.json` |
//! | `RevocationStore` | Serialized `RevocationSnapshot` | `revocations.json` |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use osk_credentials::{
//!     CredentialLifecycleManager, ExpirationPolicy, MemoryBlobStore, MemoryCounterStore,
//!     MemoryRevocationStore,
//! };
//! use osk_token::{KeyDerivation, MemoryKeyStore, SecureKeyStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryKeyStore::new());
//! store.generate().await?;
//!
//! let manager = CredentialLifecycleManager::open(
//!     Arc::new(KeyDerivation::new(store)),
//!     Arc::new(MemoryCounterStore::new()),
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(MemoryRevocationStore::new()),
//! )
//! .await?;
//!
//! let generated = manager.generate("laptop", ExpirationPolicy::NinetyDays, None).await?;
//! println!("{}", generated.token);
//!
//! manager.revoke(&generated.metadata.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod metadata;
pub mod revocation_store;
pub mod storage;

pub use error::CredentialError;
pub use manager::CredentialLifecycleManager;
pub use metadata::{CredentialMetadata, CredentialStatus, ExpirationPolicy, GeneratedCredential};
pub use revocation_store::{FileRevocationStore, MemoryRevocationStore, RevocationStore};
pub use storage::{
    BlobStore, CounterStore, FileBlobStore, FileCounterStore, MemoryBlobStore, MemoryCounterStore,
};
