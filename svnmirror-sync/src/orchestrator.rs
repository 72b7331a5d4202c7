//! Sync orchestrator: one destination, end to end.
//!
//! ## `sync_mirror`: step order
//!
//! 1. Resolve the destination remote address.
//! 2. Check for a snapshot of this destination in the cache directory.
//! 3. Create a private scratch directory (removed on every exit path).
//! 4. Restore the working copy from the snapshot, or clone the destination.
//! 5. Determine the mirror state: fresh for an import, otherwise from history.
//! 6. Ask upstream for its latest revision.
//! 7. Stop if the mirror is already at that revision.
//! 8. Link to upstream if needed, fetch, rebase, push. A failed fetch during
//!    an update still snapshots the revisions it pulled.
//! 9. Save the metadata store back into the cache.
//!
//! Nothing is retried. Push is the last destination-visible step, so a
//! failure anywhere earlier leaves the destination untouched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use svnmirror_core::{DestinationIdentity, MirrorConfig, MirrorState, Revision};

use crate::archive::Archiver;
use crate::cache::SnapshotCache;
use crate::error::{io_err, SyncError};
use crate::git::GitClient;
use crate::local_mirror::LocalMirror;
use crate::upstream::{validate_source_url, UpstreamSource};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// What to do when the snapshot cannot be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptCachePolicy {
    /// Surface `SyncError::CorruptCache`.
    #[default]
    Fail,
    /// Log a warning and clone the destination instead.
    FreshClone,
}

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Hosting service used to build the destination remote address.
    pub host: String,
    /// Branch pushed to the destination.
    pub branch: String,
    pub corrupt_cache: CorruptCachePolicy,
    /// Stop after comparing revisions; no fetch, push or cache writes.
    pub dry_run: bool,
    /// Parent of the scratch directory. Defaults to the system temp dir.
    pub scratch_root: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&MirrorConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            host: config.host.clone(),
            branch: config.branch.clone(),
            corrupt_cache: if config.fallback_on_corrupt_cache {
                CorruptCachePolicy::FreshClone
            } else {
                CorruptCachePolicy::Fail
            },
            dry_run: false,
            scratch_root: None,
        }
    }
}

/// One sync run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub destination: DestinationIdentity,
    /// Snapshot cache directory. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Upstream URL for a first-time import into an empty destination.
    pub new_source: Option<String>,
}

impl SyncRequest {
    /// Incremental update of an already imported destination.
    pub fn update(destination: DestinationIdentity) -> Self {
        Self {
            destination,
            cache_dir: None,
            new_source: None,
        }
    }

    /// First-time import of `source_url` into an empty destination.
    pub fn import(destination: DestinationIdentity, source_url: impl Into<String>) -> Self {
        Self {
            destination,
            cache_dir: None,
            new_source: Some(source_url.into()),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }
}

/// External tools the orchestrator drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub upstream: &'a dyn UpstreamSource,
    pub git: &'a dyn GitClient,
    pub archiver: &'a dyn Archiver,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    RestoringFromCache { path: PathBuf },
    CorruptCacheFallback { reason: String },
    Cloning { url: String },
    CheckingUpstream { url: String },
    Revisions { upstream: Revision, mirrored: Revision },
    Fetching { upstream: Revision },
    Fetched { current: Revision, upstream: Revision },
    Rebasing,
    Pushing { url: String, branch: String },
    SavingCache { path: PathBuf },
    CacheSaveFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Upstream had nothing new.
    UpToDate { revision: Revision },
    /// New history was pushed.
    Synced {
        previous: Revision,
        current: Revision,
        fetched: usize,
    },
    /// Dry run found new upstream history.
    WouldSync {
        mirrored: Revision,
        upstream: Revision,
    },
}

/// What happened to the snapshot artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheUpdate {
    /// No cache directory configured.
    Disabled,
    Unchanged,
    Saved { path: PathBuf },
    /// The sync itself succeeded; only the snapshot is stale.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub destination: String,
    pub source_url: String,
    pub outcome: SyncOutcome,
    pub cache: CacheUpdate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// sync_mirror
// ---------------------------------------------------------------------------

/// Bring the destination in `request` up to date with its upstream source.
///
/// `on_event` is called synchronously for each [`SyncEvent`], including once
/// per fetched revision as it arrives.
pub fn sync_mirror(
    request: &SyncRequest,
    options: &SyncOptions,
    deps: Collaborators<'_>,
    on_event: &mut dyn FnMut(&SyncEvent),
) -> Result<SyncReport, SyncError> {
    let started_at = Utc::now();
    let destination = &request.destination;
    if let Some(url) = &request.new_source {
        validate_source_url(url)?;
    }

    // Steps 1 and 2.
    let remote = destination.remote_url(&options.host);
    let cache = request
        .cache_dir
        .as_ref()
        .map(|dir| SnapshotCache::open(dir, deps.archiver))
        .transpose()?;
    let cached = cache.as_ref().is_some_and(|c| c.exists(destination));

    // Step 3.
    let scratch = scratch_dir(options.scratch_root.as_deref())?;
    let repo_dir = scratch.path().join("repo");

    // Step 4.
    let restore_from = cache
        .as_ref()
        .filter(|_| cached && request.new_source.is_none());
    let restored = match restore_from {
        Some(cache) => restore_or_fallback(cache, destination, &repo_dir, options, deps, on_event)?,
        None => None,
    };
    let from_cache = restored.is_some();
    let mut mirror = match restored {
        Some(mirror) => mirror,
        None => {
            on_event(&SyncEvent::Cloning {
                url: remote.clone(),
            });
            LocalMirror::clone_from_destination(deps.git, &remote, &repo_dir)?
        }
    };

    // Step 5.
    let state = match &request.new_source {
        Some(url) => {
            if !mirror.is_empty()? {
                return Err(SyncError::DestinationNotEmpty {
                    destination: destination.to_string(),
                });
            }
            MirrorState::fresh(url.clone())
        }
        None => mirror.read_embedded_source_info()?,
    };

    // Step 6.
    on_event(&SyncEvent::CheckingUpstream {
        url: state.source_url.clone(),
    });
    let upstream = deps.upstream.latest_revision(&state.source_url)?;
    tracing::info!(
        "{destination}: upstream r{upstream}, mirrored r{}",
        state.last_revision
    );
    on_event(&SyncEvent::Revisions {
        upstream,
        mirrored: state.last_revision,
    });

    // Step 7.
    let finish = |outcome: SyncOutcome, cache: CacheUpdate| SyncReport {
        destination: destination.to_string(),
        source_url: state.source_url.clone(),
        outcome,
        cache,
        started_at,
        finished_at: Utc::now(),
    };
    let untouched = if cache.is_some() {
        CacheUpdate::Unchanged
    } else {
        CacheUpdate::Disabled
    };
    if upstream == state.last_revision {
        tracing::info!("{destination} is up to date at r{upstream}");
        release(scratch);
        return Ok(finish(
            SyncOutcome::UpToDate { revision: upstream },
            untouched,
        ));
    }
    if options.dry_run {
        release(scratch);
        return Ok(finish(
            SyncOutcome::WouldSync {
                mirrored: state.last_revision,
                upstream,
            },
            untouched,
        ));
    }

    // Step 8.
    if !from_cache || request.new_source.is_some() {
        mirror.init_metadata(&state.source_url, state.source_instance_id.as_ref())?;
    }

    on_event(&SyncEvent::Fetching { upstream });
    let fetched = match fetch_all(&mut mirror, upstream, on_event) {
        Ok(fetched) => fetched,
        Err(e @ SyncError::FetchFailed { .. }) => {
            // Keep what was pulled so the next update resumes from there.
            if let (Some(cache), None) = (&cache, &request.new_source) {
                tracing::warn!("{destination}: fetch failed, snapshotting partial progress");
                save_snapshot(cache, destination, &mirror, on_event);
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    tracing::info!("{destination}: fetched {fetched} revision(s)");

    on_event(&SyncEvent::Rebasing);
    mirror.rebase_onto_upstream()?;

    let after = mirror.read_embedded_source_info()?;
    if after.last_revision < state.last_revision {
        return Err(SyncError::RevisionRegressed {
            before: state.last_revision,
            after: after.last_revision,
        });
    }
    if after.last_revision != upstream {
        tracing::warn!(
            "{destination}: expected r{upstream} after rebase, history records r{}",
            after.last_revision
        );
    }

    on_event(&SyncEvent::Pushing {
        url: remote.clone(),
        branch: options.branch.clone(),
    });
    mirror.push(&remote, &options.branch)?;

    // Step 9.
    let cache_update = match &cache {
        Some(cache) => save_snapshot(cache, destination, &mirror, on_event),
        None => CacheUpdate::Disabled,
    };

    release(scratch);
    Ok(finish(
        SyncOutcome::Synced {
            previous: state.last_revision,
            current: after.last_revision,
            fetched,
        },
        cache_update,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scratch_dir(root: Option<&Path>) -> Result<tempfile::TempDir, SyncError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("svnmirror-");
    match root {
        Some(root) => builder.tempdir_in(root).map_err(|e| io_err(root, e)),
        None => builder
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e)),
    }
}

/// Remove the scratch directory. Failure only leaves garbage in the temp dir.
fn release(scratch: tempfile::TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!("could not remove {}: {e}", path.display());
    }
}

fn fetch_all(
    mirror: &mut LocalMirror<'_>,
    upstream: Revision,
    on_event: &mut dyn FnMut(&SyncEvent),
) -> Result<usize, SyncError> {
    let mut fetched = 0;
    for revision in mirror.fetch_incremental()? {
        let current = revision?;
        fetched += 1;
        on_event(&SyncEvent::Fetched { current, upstream });
    }
    Ok(fetched)
}

/// Restore from the snapshot; on corruption either fail or, when the policy
/// allows it, discard the partial working copy and return `None`.
fn restore_or_fallback<'a>(
    cache: &SnapshotCache<'_>,
    destination: &DestinationIdentity,
    repo_dir: &Path,
    options: &SyncOptions,
    deps: Collaborators<'a>,
    on_event: &mut dyn FnMut(&SyncEvent),
) -> Result<Option<LocalMirror<'a>>, SyncError> {
    on_event(&SyncEvent::RestoringFromCache {
        path: cache.entry_path(destination),
    });
    match LocalMirror::restore_from_cache(deps.git, cache, destination, repo_dir) {
        Ok(mirror) => Ok(Some(mirror)),
        Err(e @ SyncError::CorruptCache { .. })
            if options.corrupt_cache == CorruptCachePolicy::FreshClone =>
        {
            tracing::warn!("{e}; cloning {destination} instead");
            on_event(&SyncEvent::CorruptCacheFallback {
                reason: e.to_string(),
            });
            if repo_dir.exists() {
                std::fs::remove_dir_all(repo_dir).map_err(|e| io_err(repo_dir, e))?;
            }
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn save_snapshot(
    cache: &SnapshotCache<'_>,
    destination: &DestinationIdentity,
    mirror: &LocalMirror<'_>,
    on_event: &mut dyn FnMut(&SyncEvent),
) -> CacheUpdate {
    on_event(&SyncEvent::SavingCache {
        path: cache.entry_path(destination),
    });
    match cache.save(destination, &mirror.metadata_dir()) {
        Ok(path) => CacheUpdate::Saved { path },
        Err(e) => {
            tracing::warn!("{destination}: sync succeeded but the cache was not saved: {e}");
            let reason = e.to_string();
            on_event(&SyncEvent::CacheSaveFailed {
                reason: reason.clone(),
            });
            CacheUpdate::Failed { reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnmirror_core::config::{DEFAULT_BRANCH, DEFAULT_HOST};

    #[test]
    fn options_follow_config() {
        let config = MirrorConfig {
            host: "git.example.org".into(),
            branch: "main".into(),
            fallback_on_corrupt_cache: true,
            ..MirrorConfig::default()
        };
        let options = SyncOptions::from_config(&config);
        assert_eq!(options.host, "git.example.org");
        assert_eq!(options.branch, "main");
        assert_eq!(options.corrupt_cache, CorruptCachePolicy::FreshClone);
        assert!(!options.dry_run);
    }

    #[test]
    fn default_options_use_default_host_and_branch() {
        let options = SyncOptions::default();
        assert_eq!(options.host, DEFAULT_HOST);
        assert_eq!(options.branch, DEFAULT_BRANCH);
        assert_eq!(options.corrupt_cache, CorruptCachePolicy::Fail);
    }

    #[test]
    fn requests_carry_source_only_for_import() {
        let widget: DestinationIdentity = "acme/widget".parse().unwrap();
        assert!(SyncRequest::update(widget.clone()).new_source.is_none());
        let import = SyncRequest::import(widget, "https://svn.example.org/widget")
            .with_cache_dir(Some(PathBuf::from("/tmp/cache")));
        assert_eq!(import.new_source.as_deref(), Some("https://svn.example.org/widget"));
        assert_eq!(import.cache_dir, Some(PathBuf::from("/tmp/cache")));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&SyncEvent::Fetched {
            current: 43,
            upstream: 50,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"fetched","current":43,"upstream":50}"#);
    }
}
