//! Two-layer request tokens for direct, account-authenticated calls.
//!
//! Wire format: `osk-req-v1.<base64url(payload)>.<hex(account signature)>.<base64url(assertion)>`.
//! The payload is short-lived and bound to a single `METHOD /path` through its
//! `act` claim. The assertion comes from the platform attestation service over
//! SHA-256 of the payload bytes; verifying it is the platform's business.

use crate::address::Address;
use crate::claims::{CanonicalPayload, generate_nonce};
use crate::error::TokenError;
use crate::keys::RecoverableSignature;
use crate::keystore::{AccessContext, KeyDerivation};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Format tag of request tokens.
pub const REQUEST_TOKEN_FORMAT: &str = "osk-req-v1";

/// Default lifetime of a request token.
pub const DEFAULT_REQUEST_TTL_SECONDS: i64 = 60;

/// Platform device attestation.
#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Register this device and return its id.
    async fn attest(&self) -> Result<String, TokenError>;

    /// Produce an assertion over a 32-byte client data hash.
    async fn assertion(&self, client_data_hash: &[u8; 32]) -> Result<Vec<u8>, TokenError>;

    /// Id of the registered device, if any.
    async fn current_device_id(&self) -> Option<String>;
}

/// Signs request tokens with the master key and a device assertion.
pub struct RequestSigner {
    derivation: Arc<KeyDerivation>,
    attestation: Arc<dyn AttestationService>,
    ttl_seconds: i64,
}

impl RequestSigner {
    pub fn new(derivation: Arc<KeyDerivation>, attestation: Arc<dyn AttestationService>) -> Self {
        Self {
            derivation,
            attestation,
            ttl_seconds: DEFAULT_REQUEST_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Sign a request token for `method path`, carrying the current counter `cnt`.
    pub async fn sign_request(&self, method: &str, path: &str, cnt: u64) -> Result<String, TokenError> {
        self.sign_request_at(method, path, cnt, Utc::now().timestamp())
            .await
    }

    /// Sign a request token as of `now` (unix seconds).
    pub async fn sign_request_at(
        &self,
        method: &str,
        path: &str,
        cnt: u64,
        now: i64,
    ) -> Result<String, TokenError> {
        let master = self
            .derivation
            .master_key(&AccessContext::new(format!("Sign {method} {path}")))
            .await?;
        let device = self.attestation.current_device_id().await;

        let payload = CanonicalPayload::new(master.address(), master.address(), cnt, now, generate_nonce())
            .with_expiry(Some(now + self.ttl_seconds))
            .with_action(action(method, path))
            .with_device(device);
        let bytes = payload.canonical_bytes()?;
        let signature = master.sign(&bytes)?;

        let assertion = self.attestation.assertion(&client_data_hash(&bytes)).await?;

        tracing::debug!(
            issuer = %master.address(),
            act = payload.act.as_deref().unwrap_or_default(),
            cnt,
            "Signed request token"
        );

        Ok(format!(
            "{REQUEST_TOKEN_FORMAT}.{}.{}.{}",
            URL_SAFE_NO_PAD.encode(&bytes),
            signature.to_hex(),
            URL_SAFE_NO_PAD.encode(&assertion)
        ))
    }
}

/// `"METHOD /path"` with the method uppercased.
pub fn action(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// SHA-256 of the payload bytes, the value the device assertion covers.
pub fn client_data_hash(payload: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(payload));
    hash
}

/// Why a request token failed the account-layer check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestRejection {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Issuer mismatch: token claims {claimed} but was signed by {recovered}")]
    IssuerMismatch { claimed: String, recovered: Address },

    #[error("Action mismatch: token is bound to {bound:?}, request is {expected}")]
    ActionMismatch { bound: Option<String>, expected: String },

    #[error("Request token has expired")]
    Expired,
}

/// A decoded request token.
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub payload_bytes: Vec<u8>,
    pub payload: CanonicalPayload,
    pub signature: RecoverableSignature,
    pub assertion: Vec<u8>,
}

impl RequestToken {
    /// Decode the four segments. Does not verify anything.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let mut parts = raw.trim().split('.');
        let (Some(REQUEST_TOKEN_FORMAT), Some(payload), Some(signature), Some(assertion), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(TokenError::MalformedToken(format!(
                "expected {REQUEST_TOKEN_FORMAT} with four segments"
            )));
        };

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| TokenError::MalformedToken(format!("payload encoding: {e}")))?;
        let payload = CanonicalPayload::from_bytes(&payload_bytes)
            .map_err(|e| TokenError::MalformedToken(format!("payload: {e}")))?;
        if !RecoverableSignature::is_canonical_hex(signature) {
            return Err(TokenError::MalformedToken(
                "signature encoding: expected lowercase hex".to_string(),
            ));
        }
        let signature_bytes = hex::decode(signature)
            .map_err(|e| TokenError::MalformedToken(format!("signature encoding: {e}")))?;
        let signature = RecoverableSignature::from_slice(&signature_bytes).ok_or_else(|| {
            TokenError::MalformedToken(format!(
                "signature must be 65 bytes, got {}",
                signature_bytes.len()
            ))
        })?;
        let assertion = URL_SAFE_NO_PAD
            .decode(assertion)
            .map_err(|e| TokenError::MalformedToken(format!("assertion encoding: {e}")))?;

        Ok(Self {
            payload_bytes,
            payload,
            signature,
            assertion,
        })
    }

    /// Hash the device assertion should have been produced over.
    pub fn client_data_hash(&self) -> [u8; 32] {
        client_data_hash(&self.payload_bytes)
    }

    /// Check the account signature, the request binding and the expiry.
    pub fn verify_account_layer(
        &self,
        method: &str,
        path: &str,
        now: i64,
    ) -> Result<Address, RequestRejection> {
        let recovered = self
            .signature
            .recover_address(&self.payload_bytes)
            .ok_or(RequestRejection::InvalidSignature)?;
        if !recovered.matches(&self.payload.iss) {
            return Err(RequestRejection::IssuerMismatch {
                claimed: self.payload.iss.clone(),
                recovered,
            });
        }

        let expected = action(method, path);
        if self.payload.act.as_deref() != Some(expected.as_str()) {
            return Err(RequestRejection::ActionMismatch {
                bound: self.payload.act.clone(),
                expected,
            });
        }

        if self.payload.is_expired_at(now) {
            return Err(RequestRejection::Expired);
        }

        Ok(recovered)
    }
}
