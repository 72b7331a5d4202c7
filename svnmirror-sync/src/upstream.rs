//! Upstream inspector: asks the source repository for its newest revision.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use url::Url;

use svnmirror_core::Revision;

use crate::error::SyncError;

/// Read-only view of the upstream source.
pub trait UpstreamSource {
    /// Current head revision of the repository at `url`.
    fn latest_revision(&self, url: &str) -> Result<Revision, SyncError>;
}

/// [`UpstreamSource`] backed by the `svn` command-line client.
#[derive(Debug, Clone)]
pub struct SvnCli {
    program: PathBuf,
}

impl Default for SvnCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("svn"),
        }
    }
}

impl SvnCli {
    /// Use a specific `svn` executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl UpstreamSource for SvnCli {
    fn latest_revision(&self, url: &str) -> Result<Revision, SyncError> {
        tracing::debug!("svn info {url} --show-item revision");
        let unreachable = |reason: String| SyncError::UpstreamUnreachable {
            url: url.to_owned(),
            reason,
        };

        let output = Command::new(&self.program)
            .args(["info", url, "--no-newline", "--show-item", "revision"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| unreachable(format!("cannot run {}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unreachable(format!(
                "svn info exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_revision(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            unreachable("svn info output did not specify the current revision".to_owned())
        })
    }
}

/// Parse the revision printed by `svn info --show-item revision`.
///
/// Surrounding whitespace is ignored. Revision 0 means the repository has no
/// history yet and is treated as unusable.
pub fn parse_revision(output: &str) -> Option<Revision> {
    output.trim().parse().ok().filter(|rev| *rev > 0)
}

/// Check that `url` looks like a repository address: it needs a scheme, a
/// host and a path, and must not carry a fragment.
pub fn validate_source_url(url: &str) -> Result<(), SyncError> {
    let invalid = |reason: &str| SyncError::InvalidSourceUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if matches!(parsed.path(), "" | "/") {
        return Err(invalid("missing repository path"));
    }
    if parsed.fragment().is_some() {
        return Err(invalid("fragments are not allowed"));
    }
    Ok(())
}
