//! Storage locations for non-secret state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File locations for the device counter, credential metadata and revocations.
///
/// Relative paths resolve against the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Monotonic device counter file.
    #[serde(default = "default_counter_file")]
    pub counter_file: PathBuf,

    /// Credential metadata blob (one JSON array).
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// Revocation source of truth (a serialized snapshot).
    #[serde(default = "default_revocations_file")]
    pub revocations_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            counter_file: default_counter_file(),
            credentials_file: default_credentials_file(),
            revocations_file: default_revocations_file(),
        }
    }
}

impl StorageConfig {
    pub fn counter_path(&self, data_dir: &Path) -> PathBuf {
        resolve(data_dir, &self.counter_file)
    }

    pub fn credentials_path(&self, data_dir: &Path) -> PathBuf {
        resolve(data_dir, &self.credentials_file)
    }

    pub fn revocations_path(&self, data_dir: &Path) -> PathBuf {
        resolve(data_dir, &self.revocations_file)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn default_counter_file() -> PathBuf {
    PathBuf::from("counter.json")
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_revocations_file() -> PathBuf {
    PathBuf::from("revocations.json")
}
