//! Error types for the token crate.

use thiserror::Error;

/// Errors that can occur while handling keys, signing, or talking to the
/// secure key store and attestation service.
///
/// Token *validation* never produces this type; it returns a
/// [`ValidationOutcome`](crate::validator::ValidationOutcome) instead.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Failed to generate a keypair.
    #[error("failed to generate keypair: {0}")]
    KeyGenerationFailed(String),

    /// Failed to parse a private key.
    #[error("failed to parse private key: {0}")]
    InvalidPrivateKey(String),

    /// Failed to parse an address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The signing primitive rejected the input.
    #[error("failed to sign payload: {0}")]
    SigningFailed(String),

    /// Failed to serialize a payload.
    #[error("payload serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A token could not be decoded for inspection.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The user declined (or failed) the authentication prompt guarding the key.
    #[error("authentication denied")]
    AuthenticationDenied,

    /// The secure key store could not be reached or produced no usable key.
    #[error("key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// The master key comes from an environment variable, so a generated
    /// key file would never be read.
    #[error("master key is supplied by environment variable {0}; unset it before generating a key file")]
    KeyProvidedByEnvironment(String),

    /// No master key has been generated yet.
    #[error("no master key found; generate one first")]
    KeyNotFound,

    /// The device attestation service failed.
    #[error("device attestation failed: {0}")]
    AttestationFailed(String),

    /// IO error (reading/writing keys).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
