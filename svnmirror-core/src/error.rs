//! Error types for svnmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, read-only filesystem, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.svnmirror/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
