//! Master key configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the master signing key comes from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyConfig {
    /// Environment variable containing the master private key (hex-encoded).
    #[serde(default)]
    pub master_key_env: Option<String>,

    /// Path to the master private key file. Relative paths resolve against
    /// the data directory.
    #[serde(default)]
    pub master_key_file: Option<PathBuf>,
}

impl KeyConfig {
    /// Path of the master key file, defaulting to `master.key` in the data directory.
    pub fn master_key_path(&self, data_dir: &Path) -> PathBuf {
        match &self.master_key_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join("master.key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key_path() {
        let config = KeyConfig::default();
        assert_eq!(
            config.master_key_path(Path::new("/data")),
            PathBuf::from("/data/master.key")
        );
    }

    #[test]
    fn test_relative_key_path_joins_data_dir() {
        let config = KeyConfig {
            master_key_env: None,
            master_key_file: Some(PathBuf::from("keys/master.key")),
        };
        assert_eq!(
            config.master_key_path(Path::new("/data")),
            PathBuf::from("/data/keys/master.key")
        );
    }

    #[test]
    fn test_absolute_key_path_is_kept() {
        let config = KeyConfig {
            master_key_env: None,
            master_key_file: Some(PathBuf::from("/etc/osk/master.key")),
        };
        assert_eq!(
            config.master_key_path(Path::new("/data")),
            PathBuf::from("/etc/osk/master.key")
        );
    }
}
