//! Public addresses derived from secp256k1 public keys.
//!
//! An address is `0x` followed by the lowercase hex of the last 20 bytes of
//! Keccak-256 over the uncompressed public key (X‖Y, without the SEC1 tag).
//! Comparisons are case-insensitive; [`Address`] always stores the lowercase
//! form so equality and hashing agree with that.

use crate::error::TokenError;
use k256::ecdsa::VerifyingKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Number of address bytes.
pub const ADDRESS_LEN: usize = 20;

/// Computes a Keccak-256 hash of the input data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Lowercase an address string for comparison or use as a map key.
pub fn normalize(address: &str) -> String {
    address.to_ascii_lowercase()
}

/// A normalized (lowercase) public address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Derive the address of a public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Skip the 0x04 uncompressed-point tag.
        let hash = keccak256(&point.as_bytes()[1..]);
        Self(format!("0x{}", hex::encode(&hash[32 - ADDRESS_LEN..])))
    }

    /// Parse an address in any letter case.
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| TokenError::InvalidAddress(format!("missing 0x prefix: {s}")))?;

        if digits.len() != ADDRESS_LEN * 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenError::InvalidAddress(format!(
                "expected 0x followed by {} hex digits: {s}",
                ADDRESS_LEN * 2
            )));
        }

        Ok(Self(format!("0x{}", normalize(digits))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a raw (possibly mixed-case) string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
