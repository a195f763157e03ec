//! Error types for the credentials crate.

use osk_token::TokenError;
use thiserror::Error;

/// Errors that can occur while issuing, revoking or persisting credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Key store, attestation or signing failure, passed through unchanged.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The device counter could not be read or advanced.
    #[error("counter store unavailable: {0}")]
    CounterStoreUnavailable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// No credential with this id.
    #[error("credential not found: {id}")]
    NotFound { id: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
