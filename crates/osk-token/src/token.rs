//! Token creation and unverified inspection.
//!
//! Wire format: `osk-v1.<base64url(payload)>.<hex(signature)>` where the
//! payload segment carries the exact canonical bytes that were signed and the
//! signature is 65 bytes `r‖s‖v`.

use crate::address::Address;
use crate::claims::{CanonicalPayload, generate_nonce};
use crate::error::TokenError;
use crate::keys::KeyPair;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;

/// Format tag of API tokens.
pub const TOKEN_FORMAT: &str = "osk-v1";

/// Claims the caller chooses when issuing a token.
///
/// `nonce` defaults to a fresh random value and `iat` to the current time.
#[derive(Debug, Clone)]
pub struct TokenParams {
    pub iss: Address,
    pub aud: Address,
    pub cnt: u64,
    pub nonce: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
    pub lbl: Option<String>,
}

impl TokenParams {
    pub fn new(iss: Address, aud: Address, cnt: u64) -> Self {
        Self {
            iss,
            aud,
            cnt,
            nonce: None,
            iat: None,
            exp: None,
            lbl: None,
        }
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    pub fn expires_at(mut self, exp: Option<i64>) -> Self {
        self.exp = exp;
        self
    }

    pub fn label(mut self, lbl: Option<String>) -> Self {
        self.lbl = lbl;
        self
    }

    /// Resolve defaults into a concrete payload.
    pub fn into_payload(self) -> CanonicalPayload {
        let nonce = self.nonce.unwrap_or_else(generate_nonce);
        let iat = self.iat.unwrap_or_else(|| Utc::now().timestamp());
        CanonicalPayload::new(&self.iss, &self.aud, self.cnt, iat, nonce)
            .with_expiry(self.exp)
            .with_label(self.lbl)
    }
}

/// Builder for signed API tokens.
///
/// Does not check `iss`/`aud` semantics; that is the validator's job on the
/// receiving side.
pub struct TokenBuilder {
    keypair: KeyPair,
}

impl TokenBuilder {
    /// Create a new token builder with the given signing keypair.
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn signer(&self) -> &KeyPair {
        &self.keypair
    }

    /// Build and sign a token from caller-chosen claims.
    pub fn build(&self, params: TokenParams) -> Result<String, TokenError> {
        self.sign_payload(&params.into_payload())
    }

    /// Sign an already assembled payload.
    pub fn sign_payload(&self, payload: &CanonicalPayload) -> Result<String, TokenError> {
        let bytes = payload.canonical_bytes()?;
        let signature = self.keypair.sign(&bytes)?;
        Ok(format!(
            "{TOKEN_FORMAT}.{}.{}",
            URL_SAFE_NO_PAD.encode(&bytes),
            signature.to_hex()
        ))
    }
}

/// Decode a token's payload without checking the signature (for display).
pub fn inspect_token_unverified(token: &str) -> Result<TokenInfo, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(format), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::MalformedToken(
            "expected exactly three segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::MalformedToken(format!("payload encoding: {e}")))?;
    let payload = CanonicalPayload::from_bytes(&bytes)
        .map_err(|e| TokenError::MalformedToken(format!("payload: {e}")))?;

    Ok(TokenInfo {
        format: format.to_string(),
        payload,
        signature_len: hex::decode(signature).map(|s| s.len()).ok(),
    })
}

/// Information about a token (for inspection).
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// Format tag of the first segment.
    pub format: String,
    /// Decoded claims. Not authenticated.
    pub payload: CanonicalPayload,
    /// Decoded signature length, if the segment is valid hex.
    pub signature_len: Option<usize>,
}
