//! The signed claim set and its canonical encoding.
//!
//! The canonical form is compact JSON with field names in lexicographic order
//! and absent optional fields omitted entirely (never `null`). Field order
//! comes from declaration order below, so keep the fields sorted.

use crate::address::{Address, normalize};
use crate::error::TokenError;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a nonce.
const NONCE_BYTES: usize = 16;

/// Claims covered by a token signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPayload {
    /// Request binding (`"METHOD /path"`), set only on two-layer request tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<String>,

    /// Audience address the token is scoped to.
    pub aud: String,

    /// Issuer counter at issuance time.
    pub cnt: u64,

    /// Device id, set only on two-layer request tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,

    /// Expiry as unix seconds. Absent means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at as unix seconds.
    pub iat: i64,

    /// Issuer address.
    pub iss: String,

    /// Optional human label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lbl: Option<String>,

    /// Random value unique per token.
    pub nonce: String,
}

impl CanonicalPayload {
    /// Create a payload with the required claims; optional claims start absent.
    pub fn new(iss: &Address, aud: &Address, cnt: u64, iat: i64, nonce: impl Into<String>) -> Self {
        Self {
            act: None,
            aud: aud.to_string(),
            cnt,
            dev: None,
            exp: None,
            iat,
            iss: iss.to_string(),
            lbl: None,
            nonce: nonce.into(),
        }
    }

    pub fn with_expiry(mut self, exp: Option<i64>) -> Self {
        self.exp = exp;
        self
    }

    pub fn with_label(mut self, lbl: Option<String>) -> Self {
        self.lbl = lbl;
        self
    }

    pub fn with_action(mut self, act: impl Into<String>) -> Self {
        self.act = Some(act.into());
        self
    }

    pub fn with_device(mut self, dev: Option<String>) -> Self {
        self.dev = dev;
        self
    }

    /// The exact bytes that get signed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TokenError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse claims from bytes. Unknown fields are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Check if the token has expired at `now` (unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.exp, Some(exp) if now > exp)
    }

    /// Lowercased issuer, for lookups.
    pub fn issuer_key(&self) -> String {
        normalize(&self.iss)
    }
}

/// Generate a fresh nonce: 16 random bytes as lowercase hex.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn sample() -> CanonicalPayload {
        let iss = address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");
        CanonicalPayload::new(&iss, &iss, 7, 1_700_000_000, "abc")
    }

    #[test]
    fn test_encoding_is_sorted_and_omits_absent_fields() {
        let bytes = sample().canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"aud":"0x7e5f4552091a69125d5dfcb7b8c2659029395bdf","cnt":7,"iat":1700000000,"iss":"0x7e5f4552091a69125d5dfcb7b8c2659029395bdf","nonce":"abc"}"#
        );
    }

    #[test]
    fn test_encoding_with_every_field() {
        let payload = sample()
            .with_expiry(Some(1_700_000_060))
            .with_label(Some("ci".to_string()))
            .with_action("GET /v1/models")
            .with_device(Some("dev-1".to_string()));
        let json = String::from_utf8(payload.canonical_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"act":"GET /v1/models","aud":"0x7e5f4552091a69125d5dfcb7b8c2659029395bdf","cnt":7,"dev":"dev-1","exp":1700000060,"iat":1700000000,"iss":"0x7e5f4552091a69125d5dfcb7b8c2659029395bdf","lbl":"ci","nonce":"abc"}"#
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = sample().with_label(Some("x".into())).canonical_bytes().unwrap();
        let b = sample().with_label(Some("x".into())).canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_ignores_unknown_fields_and_accepts_any_order() {
        let json = br#"{"nonce":"n","iss":"0xA","iat":1,"cnt":2,"aud":"0xB","extra":true}"#;
        let payload = CanonicalPayload::from_bytes(json).unwrap();
        assert_eq!(payload.cnt, 2);
        assert_eq!(payload.exp, None);
        assert_eq!(payload.issuer_key(), "0xa");
    }

    #[test]
    fn test_decode_rejects_missing_claims() {
        assert!(CanonicalPayload::from_bytes(br#"{"iss":"0xa"}"#).is_err());
        assert!(CanonicalPayload::from_bytes(b"not json").is_err());
        assert!(CanonicalPayload::from_bytes(b"").is_err());
    }

    #[test]
    fn test_expiry() {
        let never = sample();
        assert!(!never.is_expired_at(i64::MAX));

        let expiring = sample().with_expiry(Some(100));
        assert!(!expiring.is_expired_at(100));
        assert!(expiring.is_expired_at(101));
    }

    #[test]
    fn test_nonce_shape() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
