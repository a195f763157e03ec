//! Point-in-time revocation state.
//!
//! A credential is revoked if its `(issuer, nonce)` pair was revoked
//! individually, or if its issuance counter is at or below the issuer's bulk
//! threshold. Counters strictly increase at issuance, so a threshold revokes
//! everything an identity issued up to that point without listing nonces.
//!
//! Snapshots are values: the `with_*` methods consume the snapshot and return
//! a new one. Share a snapshot across threads behind an `Arc` and swap the
//! whole `Arc` on refresh.

use crate::address::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Immutable revocation state consumed by the validator.
///
/// Deserialization rebuilds the value through the normalizing constructors,
/// so keys written by other tools in any case still match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct RevocationSnapshot {
    /// Composite keys `lowercase(address):nonce`.
    revoked: HashSet<String>,

    /// `lowercase(address) -> counter threshold`.
    thresholds: HashMap<String, u64>,
}

/// On-disk shape, before normalization.
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    revoked: Vec<String>,
    #[serde(default)]
    thresholds: HashMap<String, u64>,
}

impl From<RawSnapshot> for RevocationSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let revoked = raw.revoked.into_iter().map(|key| match key.split_once(':') {
            Some((address, nonce)) => (address.to_string(), nonce.to_string()),
            None => (key, String::new()),
        });
        Self::from_parts(revoked, raw.thresholds)
    }
}

impl RevocationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw parts, normalizing every address.
    pub fn from_parts<K, T>(revoked: K, thresholds: T) -> Self
    where
        K: IntoIterator<Item = (String, String)>,
        T: IntoIterator<Item = (String, u64)>,
    {
        let mut snapshot = Self::default();
        for (address, nonce) in revoked {
            snapshot = snapshot.with_revoked(&address, &nonce);
        }
        for (address, threshold) in thresholds {
            snapshot = snapshot.with_threshold(&address, threshold);
        }
        snapshot
    }

    /// Composite key for an individually revoked credential.
    ///
    /// Writers and readers both go through this so normalization is symmetric.
    pub fn key(address: &str, nonce: &str) -> String {
        format!("{}:{}", normalize(address), nonce)
    }

    /// Check whether a credential is revoked.
    pub fn is_revoked(&self, address: &str, nonce: &str, cnt: u64) -> bool {
        if self.revoked.contains(&Self::key(address, nonce)) {
            return true;
        }
        self.threshold(address).is_some_and(|threshold| cnt <= threshold)
    }

    /// Bulk-revocation threshold of an address, if any.
    pub fn threshold(&self, address: &str) -> Option<u64> {
        self.thresholds.get(&normalize(address)).copied()
    }

    /// Return a snapshot that additionally revokes `(address, nonce)`.
    pub fn with_revoked(mut self, address: &str, nonce: &str) -> Self {
        self.revoked.insert(Self::key(address, nonce));
        self
    }

    /// Return a snapshot that revokes everything `address` issued with a
    /// counter at or below `threshold`. Thresholds never move backwards.
    pub fn with_threshold(mut self, address: &str, threshold: u64) -> Self {
        let entry = self.thresholds.entry(normalize(address)).or_insert(threshold);
        *entry = (*entry).max(threshold);
        self
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    pub fn threshold_count(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty() && self.thresholds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
    const ADDR_UPPER: &str = "0x7E5F4552091A69125D5DFCB7B8C2659029395BDF";

    #[test]
    fn test_key_is_lowercased() {
        assert_eq!(RevocationSnapshot::key(ADDR_UPPER, "n1"), format!("{ADDR}:n1"));
    }

    #[test]
    fn test_empty_snapshot_revokes_nothing() {
        let snapshot = RevocationSnapshot::new();
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_revoked(ADDR, "n1", 0));
    }

    #[test]
    fn test_individual_revocation() {
        let snapshot = RevocationSnapshot::new().with_revoked(ADDR, "n1");
        assert!(snapshot.is_revoked(ADDR, "n1", 5));
        assert!(!snapshot.is_revoked(ADDR, "n2", 5));
    }

    #[test]
    fn test_revocation_is_case_insensitive() {
        let snapshot = RevocationSnapshot::new().with_revoked(ADDR_UPPER, "n1");
        assert!(snapshot.is_revoked(ADDR, "n1", 5));

        let snapshot = RevocationSnapshot::new().with_threshold(ADDR, 10);
        assert!(snapshot.is_revoked(ADDR_UPPER, "any", 10));
    }

    #[test]
    fn test_nonce_is_case_sensitive() {
        let snapshot = RevocationSnapshot::new().with_revoked(ADDR, "abc");
        assert!(!snapshot.is_revoked(ADDR, "ABC", 1));
    }

    #[test]
    fn test_counter_threshold() {
        let snapshot = RevocationSnapshot::new().with_threshold(ADDR, 10);
        assert!(snapshot.is_revoked(ADDR, "x", 1));
        assert!(snapshot.is_revoked(ADDR, "x", 10));
        assert!(!snapshot.is_revoked(ADDR, "x", 11));
        assert!(!snapshot.is_revoked("0x0000000000000000000000000000000000000001", "x", 1));
    }

    #[test]
    fn test_threshold_never_decreases() {
        let snapshot = RevocationSnapshot::new()
            .with_threshold(ADDR, 10)
            .with_threshold(ADDR_UPPER, 3);
        assert_eq!(snapshot.threshold(ADDR), Some(10));
        assert_eq!(snapshot.threshold_count(), 1);
    }

    #[test]
    fn test_from_parts_normalizes() {
        let snapshot = RevocationSnapshot::from_parts(
            vec![(ADDR_UPPER.to_string(), "n".to_string())],
            vec![(ADDR_UPPER.to_string(), 4)],
        );
        assert!(snapshot.is_revoked(ADDR, "n", 100));
        assert_eq!(snapshot.threshold(ADDR), Some(4));
        assert_eq!(snapshot.revoked_count(), 1);
    }

    #[test]
    fn test_serde_roundtrip_preserves_decisions() {
        let snapshot = RevocationSnapshot::new()
            .with_revoked(ADDR, "n1")
            .with_threshold(ADDR, 2);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RevocationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        let empty: RevocationSnapshot = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_deserialize_normalizes_addresses() {
        let json = format!(
            r#"{{"revoked":["{ADDR_UPPER}:Nonce"],"thresholds":{{"{ADDR_UPPER}":5}}}}"#
        );
        let snapshot: RevocationSnapshot = serde_json::from_str(&json).unwrap();

        assert!(snapshot.is_revoked(ADDR, "Nonce", 100));
        assert!(!snapshot.is_revoked(ADDR, "nonce", 100));
        assert!(snapshot.is_revoked(ADDR, "x", 1));
        assert_eq!(snapshot.threshold(ADDR), Some(5));
        assert_eq!(
            snapshot,
            RevocationSnapshot::new()
                .with_revoked(ADDR, "Nonce")
                .with_threshold(ADDR, 5)
        );
    }

    #[test]
    fn test_deserialize_merges_thresholds_differing_in_case() {
        let json = format!(r#"{{"thresholds":{{"{ADDR_UPPER}":9,"{ADDR}":4}}}}"#);
        let snapshot: RevocationSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot.threshold_count(), 1);
        assert_eq!(snapshot.threshold(ADDR), Some(9));
    }
}
