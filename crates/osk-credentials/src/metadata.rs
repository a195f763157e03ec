//! Persisted, non-secret credential metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters of the token kept for display.
pub const PREFIX_LEN: usize = 16;

/// How long a generated credential stays valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    #[serde(rename = "30d")]
    ThirtyDays,
    #[default]
    #[serde(rename = "90d")]
    NinetyDays,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "never")]
    Never,
}

impl ExpirationPolicy {
    pub const ALL: [ExpirationPolicy; 4] = [
        ExpirationPolicy::ThirtyDays,
        ExpirationPolicy::NinetyDays,
        ExpirationPolicy::OneYear,
        ExpirationPolicy::Never,
    ];

    /// Lifetime of the policy, `None` for credentials that never expire.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::ThirtyDays => Some(Duration::days(30)),
            Self::NinetyDays => Some(Duration::days(90)),
            Self::OneYear => Some(Duration::days(365)),
            Self::Never => None,
        }
    }

    /// Expiry for a credential issued at `issued_at`.
    pub fn expires_at(self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| issued_at + d)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThirtyDays => "30d",
            Self::NinetyDays => "90d",
            Self::OneYear => "1y",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for ExpirationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpirationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "30d" => Ok(Self::ThirtyDays),
            "90d" => Ok(Self::NinetyDays),
            "1y" | "365d" => Ok(Self::OneYear),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown expiration '{other}', expected one of 30d, 90d, 1y, never"
            )),
        }
    }
}

/// What is remembered about an issued credential.
///
/// The token itself, its signature and any key material are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub id: String,
    pub label: String,
    /// First characters of the token followed by an ellipsis.
    pub prefix: String,
    pub nonce: String,
    pub counter: u64,
    pub issuer: String,
    pub audience: String,
    pub created_at: DateTime<Utc>,
    pub expiration: ExpirationPolicy,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
    /// Agent index when issued by a derived agent identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_index: Option<u32>,
}

impl CredentialMetadata {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    pub fn status(&self, now: DateTime<Utc>) -> CredentialStatus {
        if self.revoked {
            CredentialStatus::Revoked
        } else if self.is_expired_at(now) {
            CredentialStatus::Expired
        } else {
            CredentialStatus::Active
        }
    }
}

/// Display status of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Revoked,
    Expired,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        })
    }
}

/// Display prefix of a token.
pub fn token_prefix(token: &str) -> String {
    let head: String = token.chars().take(PREFIX_LEN).collect();
    format!("{head}…")
}

/// A freshly generated credential. The token is only available here.
#[derive(Clone)]
pub struct GeneratedCredential {
    pub token: String,
    pub metadata: CredentialMetadata,
}

impl fmt::Debug for GeneratedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCredential")
            .field("token", &self.metadata.prefix)
            .field("metadata", &self.metadata)
            .finish()
    }
}
