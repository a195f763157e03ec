//! # osk-core
//!
//! Configuration shared by every osk crate.
//!
//! Configuration is read from a single YAML file (`osk.yaml` by default) and
//! describes where the master key, device counter, credential metadata and
//! revocation state live, which issuers are trusted, and which agent indices
//! are presented to the user.

// Configuration types shared across all osk crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    AgentConfig, ConfigError, KeyConfig, LoggingConfig, OskConfig, StorageConfig,
    TrustConfigSection,
};
