//! # svnmirror-sync
//!
//! Incremental, resumable mirroring of an upstream Subversion repository
//! into a hosted Git destination.
//!
//! Call [`sync_mirror`] with a [`SyncRequest`] to import a new source or
//! update an existing mirror. External tools sit behind narrow traits:
//! [`UpstreamSource`] (revision query), [`GitClient`] (working copy
//! operations) and [`Archiver`] (snapshot packing).

pub mod archive;
pub mod cache;
pub mod error;
pub mod git;
pub mod local_mirror;
pub mod orchestrator;
pub mod upstream;

pub use archive::{Archiver, TarArchiver};
pub use cache::SnapshotCache;
pub use error::SyncError;
pub use git::{FetchStream, GitCli, GitClient};
pub use local_mirror::{FetchProgress, LocalMirror, MirrorPhase, METADATA_DIR};
pub use orchestrator::{
    sync_mirror, CacheUpdate, Collaborators, CorruptCachePolicy, SyncEvent, SyncOptions,
    SyncOutcome, SyncReport, SyncRequest,
};
pub use upstream::{SvnCli, UpstreamSource};
