//! Token validation.
//!
//! [`validate_at`] is a pure, total function: any input string yields one of
//! the four [`ValidationOutcome`] variants. Checks run in a fixed order and
//! stop at the first failure:
//!
//! 1. format tag and segment count
//! 2. base64url payload decoding
//! 3. claim parsing
//! 4. hex signature decoding (exactly 65 bytes)
//! 5. signer recovery over the *raw* payload bytes, compared to `iss`
//! 6. issuer whitelist
//! 7. audience
//! 8. revocation (before expiry, so a revocation is never reported as expiry)
//! 9. expiry

use crate::address::{Address, normalize};
use crate::claims::CanonicalPayload;
use crate::keys::RecoverableSignature;
use crate::revocation::RevocationSnapshot;
use crate::token::TOKEN_FORMAT;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Result of validating a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Authentic, trusted, in scope, not revoked, not expired.
    Valid { issuer: Address },
    /// Rejected before revocation/expiry checks.
    Invalid(InvalidReason),
    /// Revoked individually or by counter threshold.
    Revoked,
    /// Past its `exp`.
    Expired,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Human-readable reason for a rejected token.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid(reason) => Some(reason.to_string()),
            Self::Revoked => Some("Token has been revoked".to_string()),
            Self::Expired => Some("Token has expired".to_string()),
        }
    }
}

/// Why a token was rejected as invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("Unrecognized token format")]
    UnrecognizedFormat,

    #[error("Invalid payload encoding")]
    PayloadEncoding,

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Invalid signature encoding")]
    SignatureEncoding,

    #[error("Invalid signature encoding: expected 65 bytes, got {len}")]
    SignatureLength { len: usize },

    /// The signature does not recover to any public key.
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Issuer mismatch: token claims {claimed} but was signed by {recovered}")]
    IssuerMismatch { claimed: String, recovered: Address },

    #[error("Issuer {issuer} is not whitelisted")]
    NotWhitelisted { issuer: String },

    #[error("Audience {audience} is not accepted")]
    AudienceMismatch { audience: String },
}

/// Audiences a token may be scoped to: the local master identity and,
/// optionally, one agent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAudiences {
    pub master: Address,
    pub agent: Option<Address>,
}

impl AcceptedAudiences {
    pub fn new(master: Address, agent: Option<Address>) -> Self {
        Self { master, agent }
    }

    /// Case-insensitive membership.
    pub fn contains(&self, audience: &str) -> bool {
        self.master.matches(audience) || self.agent.as_ref().is_some_and(|a| a.matches(audience))
    }
}

/// Everything the validator needs to decide on a token.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub accepted_audiences: AcceptedAudiences,
    pub issuer_whitelist: HashSet<Address>,
    pub revocations: Arc<RevocationSnapshot>,
}

impl TrustConfig {
    /// Trust the master (and agent, if any) as both audience and issuer.
    pub fn new(master: Address, agent: Option<Address>) -> Self {
        let mut issuer_whitelist = HashSet::new();
        issuer_whitelist.insert(master.clone());
        if let Some(agent) = &agent {
            issuer_whitelist.insert(agent.clone());
        }
        Self {
            accepted_audiences: AcceptedAudiences::new(master, agent),
            issuer_whitelist,
            revocations: Arc::new(RevocationSnapshot::default()),
        }
    }

    /// Add another trusted issuer.
    pub fn trust_issuer(mut self, issuer: Address) -> Self {
        self.issuer_whitelist.insert(issuer);
        self
    }

    /// Replace the revocation snapshot.
    pub fn with_revocations(mut self, revocations: Arc<RevocationSnapshot>) -> Self {
        self.revocations = revocations;
        self
    }

    /// Case-insensitive whitelist membership.
    pub fn is_whitelisted(&self, issuer: &str) -> bool {
        Address::parse(issuer).is_ok_and(|address| self.issuer_whitelist.contains(&address))
    }
}

/// Validate a token against the current clock.
pub fn validate(raw: &str, trust: &TrustConfig) -> ValidationOutcome {
    validate_at(raw, trust, Utc::now().timestamp())
}

/// Validate a token as of `now` (unix seconds).
pub fn validate_at(raw: &str, trust: &TrustConfig, now: i64) -> ValidationOutcome {
    match check(raw, trust, now) {
        Ok(outcome) => outcome,
        Err(reason) => ValidationOutcome::Invalid(reason),
    }
}

fn check(raw: &str, trust: &TrustConfig, now: i64) -> Result<ValidationOutcome, InvalidReason> {
    // 1. Format
    let (payload_b64, signature_hex) = split_token(raw).ok_or(InvalidReason::UnrecognizedFormat)?;

    // 2. Payload encoding
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| InvalidReason::PayloadEncoding)?;

    // 3. Claims
    let payload =
        CanonicalPayload::from_bytes(&payload_bytes).map_err(|_| InvalidReason::MalformedPayload)?;

    // 4. Signature encoding, lowercase hex only
    if !RecoverableSignature::is_canonical_hex(signature_hex) {
        return Err(InvalidReason::SignatureEncoding);
    }
    let signature_bytes = hex::decode(signature_hex).map_err(|_| InvalidReason::SignatureEncoding)?;
    let signature = RecoverableSignature::from_slice(&signature_bytes).ok_or(
        InvalidReason::SignatureLength {
            len: signature_bytes.len(),
        },
    )?;

    // 5. Signer, recovered over the bytes as received
    let recovered = signature
        .recover_address(&payload_bytes)
        .ok_or(InvalidReason::InvalidSignature)?;
    if !recovered.matches(&payload.iss) {
        return Err(InvalidReason::IssuerMismatch {
            claimed: payload.iss,
            recovered,
        });
    }

    // 6. Issuer whitelist
    if !trust.issuer_whitelist.contains(&recovered) {
        return Err(InvalidReason::NotWhitelisted {
            issuer: payload.iss,
        });
    }

    // 7. Audience
    if !trust.accepted_audiences.contains(&payload.aud) {
        return Err(InvalidReason::AudienceMismatch {
            audience: normalize(&payload.aud),
        });
    }

    // 8. Revocation
    if trust
        .revocations
        .is_revoked(&payload.iss, &payload.nonce, payload.cnt)
    {
        return Ok(ValidationOutcome::Revoked);
    }

    // 9. Expiry
    if payload.is_expired_at(now) {
        return Ok(ValidationOutcome::Expired);
    }

    Ok(ValidationOutcome::Valid { issuer: recovered })
}

/// Split `osk-v1.<payload>.<signature>` into its two data segments.
fn split_token(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix(TOKEN_FORMAT)?.strip_prefix('.')?;
    let (payload, signature) = rest.split_once('.')?;
    if signature.contains('.') {
        return None;
    }
    Some((payload, signature))
}
