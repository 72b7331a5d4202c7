//! Optional user configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.svnmirror/
//!   config.yaml
//! ```
//!
//! The file is only read, never written. Loading takes the home directory
//! as an argument; the binary resolves it once with [`home`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "github.com";
pub const DEFAULT_BRANCH: &str = "master";

/// Settings shared by every run. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Where snapshot artifacts live. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Hosting service used to build destination remote addresses.
    pub host: String,
    /// Branch pushed to the destination.
    pub branch: String,
    /// Clone fresh (with a warning) instead of failing on an unreadable snapshot.
    pub fallback_on_corrupt_cache: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            host: DEFAULT_HOST.to_owned(),
            branch: DEFAULT_BRANCH.to_owned(),
            fallback_on_corrupt_cache: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.svnmirror/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".svnmirror").join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.svnmirror/config.yaml`.
///
/// A missing file yields [`MirrorConfig::default`]; malformed YAML yields
/// `ConfigError::Parse` with the file path.
pub fn load_at(home: &Path) -> Result<MirrorConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(MirrorConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(MirrorConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Home directory as reported by the platform.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().unwrap();
        assert!(config_path_at(home.path()).ends_with(".svnmirror/config.yaml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, MirrorConfig::default());
        assert_eq!(config.host, "github.com");
        assert_eq!(config.branch, "master");
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn full_file_is_read() {
        let home = TempDir::new().unwrap();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "cache_dir: /var/cache/svnmirror\nhost: git.example.org\nbranch: main\nfallback_on_corrupt_cache: true\n",
        )
        .unwrap();

        let config = load_at(home.path()).expect("load");
        assert_eq!(
            config,
            MirrorConfig {
                cache_dir: Some(PathBuf::from("/var/cache/svnmirror")),
                host: "git.example.org".into(),
                branch: "main".into(),
                fallback_on_corrupt_cache: true,
            }
        );
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
