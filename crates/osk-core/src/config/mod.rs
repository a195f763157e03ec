//! Configuration types for osk.
//!
//! Configuration is loaded from a YAML file (`osk.yaml`) into a single
//! [`OskConfig`]. Every section is optional; an empty file yields a working
//! configuration rooted at `.osk/`.
//!
//! ```yaml
//! data_dir: /var/lib/osk
//! keys:
//!   master_key_env: OSK_MASTER_KEY
//! trust:
//!   whitelist:
//!     - "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
//! agents:
//!   - index: 3
//!     label: scheduler
//! logging:
//!   filter: debug
//! ```

pub mod keys;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use keys::KeyConfig;
pub use storage::StorageConfig;

/// Complete osk configuration loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OskConfig {
    /// Directory holding keys, counters, metadata and revocations.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Master key source.
    #[serde(default)]
    pub keys: KeyConfig,

    /// Storage file locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Trusted issuers.
    #[serde(default)]
    pub trust: TrustConfigSection,

    /// Agent identities presented to the user.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for OskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keys: KeyConfig::default(),
            storage: StorageConfig::default(),
            trust: TrustConfigSection::default(),
            agents: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Issuer trust settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrustConfigSection {
    /// Additional issuer addresses accepted by the validator. The local
    /// master address is always trusted and need not be listed.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// A labelled agent index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Derivation index.
    pub index: u32,

    /// Human-readable label.
    #[serde(default)]
    pub label: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from(".osk")
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OskConfig {
    /// Load configuration from a YAML file.
    ///
    /// A relative `data_dir` resolves against the directory holding the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if config.data_dir.is_relative() {
            let base_dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            config.data_dir = base_dir.join(&config.data_dir);
        }

        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.index) {
                return Err(ConfigError::Config(format!(
                    "agent index {} is configured more than once",
                    agent.index
                )));
            }
        }

        Ok(())
    }

    /// Get the configured label of an agent index.
    pub fn agent_label(&self, index: u32) -> Option<&str> {
        self.agents
            .iter()
            .find(|a| a.index == index)
            .map(|a| a.label.as_str())
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.keys.master_key_path(&self.data_dir)
    }

    pub fn counter_path(&self) -> PathBuf {
        self.storage.counter_path(&self.data_dir)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.storage.credentials_path(&self.data_dir)
    }

    pub fn revocations_path(&self) -> PathBuf {
        self.storage.revocations_path(&self.data_dir)
    }
}
