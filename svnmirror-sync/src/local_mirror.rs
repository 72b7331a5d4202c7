//! Local mirror: the working copy that sits between upstream and destination.
//!
//! ## Lifecycle
//!
//! ```text
//! Absent ─┬─ clone_from_destination ─→ ClonedFromDestination ─┐
//!         └─ restore_from_cache ─────→ RestoredFromCache ─────┤
//!                                                             │ init_metadata (optional)
//!                                      MetadataInitialized ←──┤
//!                                                             ▼
//!            FetchInProgress ─→ FetchComplete ─→ Rebased ─→ Pushed
//! ```
//!
//! The working copy keeps its sync state in history: the newest commit's
//! message ends with a source trailer (see [`MirrorState::from_commit_body`]).

use std::fmt;
use std::path::{Path, PathBuf};

use svnmirror_core::{DestinationIdentity, MirrorState, Revision, SourceInstanceId};

use crate::cache::SnapshotCache;
use crate::error::{io_err, SyncError};
use crate::git::{FetchStream, GitClient};

/// Name of the metadata store directory inside a working copy.
pub const METADATA_DIR: &str = ".git";

/// Where a [`LocalMirror`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    ClonedFromDestination,
    RestoredFromCache,
    MetadataInitialized,
    FetchInProgress,
    FetchComplete,
    Rebased,
    Pushed,
}

impl fmt::Display for MirrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MirrorPhase::ClonedFromDestination => "cloned from destination",
            MirrorPhase::RestoredFromCache => "restored from cache",
            MirrorPhase::MetadataInitialized => "linked to upstream",
            MirrorPhase::FetchInProgress => "fetching",
            MirrorPhase::FetchComplete => "fetched",
            MirrorPhase::Rebased => "rebased",
            MirrorPhase::Pushed => "pushed",
        };
        f.write_str(s)
    }
}

/// A working copy driven through one sync run.
pub struct LocalMirror<'c> {
    client: &'c dyn GitClient,
    dir: PathBuf,
    phase: MirrorPhase,
}

impl<'c> LocalMirror<'c> {
    /// Clone the destination into `dir`, which must not exist yet.
    pub fn clone_from_destination(
        client: &'c dyn GitClient,
        url: &str,
        dir: &Path,
    ) -> Result<Self, SyncError> {
        create_fresh_dir(dir)?;
        tracing::info!("cloning {url} into {}", dir.display());
        client.clone_repo(url, dir)?;
        Ok(Self {
            client,
            dir: dir.to_path_buf(),
            phase: MirrorPhase::ClonedFromDestination,
        })
    }

    /// Rebuild a working copy at `dir` from the cached metadata store of
    /// `destination`, then check out its files.
    pub fn restore_from_cache(
        client: &'c dyn GitClient,
        cache: &SnapshotCache<'_>,
        destination: &DestinationIdentity,
        dir: &Path,
    ) -> Result<Self, SyncError> {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let metadata = dir.join(METADATA_DIR);
        create_fresh_dir(&metadata)?;
        cache.restore(destination, &metadata)?;
        client.checkout_worktree(dir)?;
        Ok(Self {
            client,
            dir: dir.to_path_buf(),
            phase: MirrorPhase::RestoredFromCache,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The history store that the snapshot cache archives.
    pub fn metadata_dir(&self) -> PathBuf {
        self.dir.join(METADATA_DIR)
    }

    pub fn phase(&self) -> MirrorPhase {
        self.phase
    }

    /// Parse the sync state recorded in the newest commit.
    pub fn read_embedded_source_info(&self) -> Result<MirrorState, SyncError> {
        self.client
            .head_commit_body(&self.dir)?
            .as_deref()
            .and_then(MirrorState::from_commit_body)
            .ok_or_else(|| SyncError::NoSourceMetadata {
                path: self.dir.clone(),
            })
    }

    /// True while the working copy has no branches at all.
    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(!self.client.has_branches(&self.dir)?)
    }

    /// Link the working copy to `source_url`, adopting `instance_id` when given.
    ///
    /// Fails with `AlreadyInitialized` if a link already exists.
    pub fn init_metadata(
        &mut self,
        source_url: &str,
        instance_id: Option<&SourceInstanceId>,
    ) -> Result<(), SyncError> {
        self.expect_phase(
            "link to upstream",
            &[
                MirrorPhase::ClonedFromDestination,
                MirrorPhase::RestoredFromCache,
            ],
        )?;
        if let Some(url) = self.client.linked_source(&self.dir)? {
            return Err(SyncError::AlreadyInitialized {
                path: self.dir.clone(),
                url,
            });
        }
        match instance_id {
            Some(id) => tracing::info!("linking {} to {source_url} as {id}", self.dir.display()),
            None => tracing::info!("linking {} to {source_url}", self.dir.display()),
        }
        self.client
            .link_source(&self.dir, source_url, instance_id.map(|id| id.0.as_str()))?;
        self.phase = MirrorPhase::MetadataInitialized;
        Ok(())
    }

    /// Pull new upstream history, yielding each revision as it lands.
    ///
    /// The sequence is strictly increasing. Revisions pulled before a
    /// failure remain in the metadata store for the next run.
    pub fn fetch_incremental(&mut self) -> Result<FetchProgress<'_>, SyncError> {
        self.expect_phase(
            "fetch",
            &[
                MirrorPhase::ClonedFromDestination,
                MirrorPhase::RestoredFromCache,
                MirrorPhase::MetadataInitialized,
                MirrorPhase::FetchComplete,
            ],
        )?;
        let client: &dyn GitClient = self.client;
        let inner = client.fetch(&self.dir)?;
        self.phase = MirrorPhase::FetchInProgress;
        Ok(FetchProgress {
            inner,
            phase: &mut self.phase,
            last: None,
            failed: false,
        })
    }

    /// Replay the pulled revisions onto the local branch tip.
    pub fn rebase_onto_upstream(&mut self) -> Result<(), SyncError> {
        self.expect_phase("rebase", &[MirrorPhase::FetchComplete])?;
        tracing::info!("rebasing {}", self.dir.display());
        self.client.rebase(&self.dir)?;
        self.phase = MirrorPhase::Rebased;
        Ok(())
    }

    /// Push `branch` to the destination. Only a rebased copy may be pushed.
    pub fn push(&mut self, url: &str, branch: &str) -> Result<(), SyncError> {
        self.expect_phase("push", &[MirrorPhase::Rebased])?;
        tracing::info!("pushing {branch} to {url}");
        self.client.push(&self.dir, url, branch)?;
        self.phase = MirrorPhase::Pushed;
        Ok(())
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        allowed: &[MirrorPhase],
    ) -> Result<(), SyncError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SyncError::OutOfOrder {
                operation,
                phase: self.phase.to_string(),
            })
        }
    }
}

/// Revisions arriving from an in-flight fetch.
///
/// Yields a strictly increasing sequence; repeated or older revisions from
/// the client are skipped. Moves the mirror to `FetchComplete` only when the
/// pull ends without an error. After the first error the sequence is over
/// and the mirror stays in `FetchInProgress`.
pub struct FetchProgress<'m> {
    inner: FetchStream<'m>,
    phase: &'m mut MirrorPhase,
    last: Option<Revision>,
    failed: bool,
}

impl Iterator for FetchProgress<'_> {
    type Item = Result<Revision, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Ok(rev)) if self.last.is_some_and(|last| rev <= last) => {
                    tracing::debug!("ignoring repeated revision r{rev}");
                    continue;
                }
                Some(Ok(rev)) => {
                    self.last = Some(rev);
                    return Some(Ok(rev));
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => {
                    *self.phase = MirrorPhase::FetchComplete;
                    return None;
                }
            }
        }
    }
}

fn create_fresh_dir(dir: &Path) -> Result<(), SyncError> {
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::create_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => SyncError::DirectoryConflict {
            path: dir.to_path_buf(),
        },
        _ => io_err(dir, e),
    })
}
