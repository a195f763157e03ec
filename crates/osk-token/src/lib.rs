//! # osk-token
//!
//! Signed bearer tokens for a local master identity and its derived agents.
//!
//! This crate provides:
//! - secp256k1 keypairs with Keccak-256 addresses
//! - deterministic agent key derivation from the master key
//! - the canonical claim encoding that gets signed
//! - token issuance and the ordered validation procedure
//! - immutable revocation snapshots
//! - two-layer request tokens carrying a device assertion
//!
//! ## Token shapes
//!
//! | Token | Format | Signed by | Lifetime |
//! |-------|--------|-----------|----------|
//! | **API token** | `osk-v1.<payload>.<sig>` | Master or agent key | Policy-defined, may never expire |
//! | **Request token** | `osk-req-v1.<payload>.<sig>.<assertion>` | Master key + device | 60 seconds, one `METHOD /path` |
//!
//! Signatures are recoverable, so a token carries no public key: the verifier
//! recovers the signer's address and compares it against the `iss` claim.

pub mod address;
pub mod claims;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod request;
pub mod revocation;
pub mod token;
pub mod validator;

pub use address::Address;
pub use claims::{CanonicalPayload, generate_nonce};
pub use error::TokenError;
pub use keys::{KeyPair, RecoverableSignature, derive_agent_key};
pub use keystore::{
    AccessContext, AgentInfo, FileKeyStore, KeyDerivation, MemoryKeyStore, SecureKeyStore,
};
pub use request::{AttestationService, RequestRejection, RequestSigner, RequestToken};
pub use revocation::RevocationSnapshot;
pub use token::{TOKEN_FORMAT, TokenBuilder, TokenInfo, TokenParams, inspect_token_unverified};
pub use validator::{
    AcceptedAudiences, InvalidReason, TrustConfig, ValidationOutcome, validate, validate_at,
};
