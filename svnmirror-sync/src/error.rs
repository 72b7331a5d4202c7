//! Error types for svnmirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use svnmirror_core::Revision;

/// All errors that can arise from a sync run.
///
/// Every error is fatal to the current run; nothing is retried automatically.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The upstream revision query could not run or printed no usable revision.
    #[error("cannot determine latest revision of {url}: {reason}")]
    UpstreamUnreachable { url: String, reason: String },

    /// A directory that must be created fresh already exists.
    #[error("directory already exists: {path}")]
    DirectoryConflict { path: PathBuf },

    /// The newest commit carries no source trailer.
    #[error("no sync metadata found in the newest commit of {path}; import the source first")]
    NoSourceMetadata { path: PathBuf },

    /// A new source was requested for a destination that already has branches.
    #[error("cannot import a new source: destination {destination} is not empty")]
    DestinationNotEmpty { destination: String },

    /// The working copy is already linked to an upstream source.
    #[error("working copy at {path} is already linked to {url}")]
    AlreadyInitialized { path: PathBuf, url: String },

    /// The incremental pull terminated abnormally. Revisions pulled before
    /// the failure stay in the metadata store.
    #[error("fetch from upstream failed: {reason}")]
    FetchFailed { reason: String },

    /// Replaying upstream history onto the local branch failed.
    #[error("rebase onto upstream failed: {reason}")]
    RebaseFailed { reason: String },

    /// The destination refused the push.
    #[error("push to {url} rejected: {reason}")]
    PushRejected { url: String, reason: String },

    /// The snapshot artifact could not be read back.
    #[error("cache artifact {path} is unreadable: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external tool could not be started or failed.
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("'{url}' is not a valid source URL: {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    /// A local mirror operation was called before its prerequisite step.
    #[error("cannot {operation} while the working copy is {phase}")]
    OutOfOrder {
        operation: &'static str,
        phase: String,
    },

    /// History after the run records an older revision than before it.
    #[error("mirrored revision went backwards: r{before} -> r{after}")]
    RevisionRegressed { before: Revision, after: Revision },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
