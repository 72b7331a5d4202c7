pub mod import;
pub mod status;
pub mod update;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use svnmirror_core::config;
use svnmirror_sync::{
    sync_mirror, CacheUpdate, Collaborators, CorruptCachePolicy, GitCli, SvnCli, SyncEvent,
    SyncOptions, SyncOutcome, SyncReport, SyncRequest, TarArchiver,
};

/// Options shared by every command. Unset values fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncFlags {
    /// Directory holding working-copy snapshots between runs.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Hosting service of the destination [default: github.com].
    #[arg(long)]
    pub host: Option<String>,

    /// Destination branch to push [default: master].
    #[arg(long)]
    pub branch: Option<String>,

    /// Clone the destination instead of failing when the snapshot is unreadable.
    #[arg(long)]
    pub fallback_on_corrupt_cache: bool,

    /// Emit the final report as JSON instead of progress lines.
    #[arg(long)]
    pub json: bool,
}

impl SyncFlags {
    /// Merge command-line flags over `<home>/.svnmirror/config.yaml`.
    fn resolve_at(&self, home: &Path) -> Result<(Option<PathBuf>, SyncOptions)> {
        let config = config::load_at(home).with_context(|| {
            format!("failed to load {}", config::config_path_at(home).display())
        })?;

        let mut options = SyncOptions::from_config(&config);
        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        if let Some(branch) = &self.branch {
            options.branch = branch.clone();
        }
        if self.fallback_on_corrupt_cache {
            options.corrupt_cache = CorruptCachePolicy::FreshClone;
        }
        Ok((self.cache_dir.clone().or(config.cache_dir), options))
    }
}

/// Run one sync against the real `svn` and `git` tools and print the result.
pub(crate) fn execute(request: SyncRequest, flags: &SyncFlags, dry_run: bool) -> Result<()> {
    let home = config::home().context("could not determine home directory")?;
    let (cache_dir, mut options) = flags.resolve_at(&home)?;
    options.dry_run = dry_run;
    let request = request.with_cache_dir(cache_dir);
    tracing::debug!(?options, cache_dir = ?request.cache_dir, "resolved run options");

    let svn = SvnCli::default();
    let git = GitCli::default();
    let deps = Collaborators {
        upstream: &svn,
        git: &git,
        archiver: &TarArchiver,
    };

    let mut progress = Progress::new(!flags.json);
    let result = sync_mirror(&request, &options, deps, &mut |event| progress.show(event));
    progress.finish_line();
    let report = result.with_context(|| format!("sync of {} failed", request.destination))?;

    if flags.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Renders [`SyncEvent`]s as they arrive. Fetch progress rewrites one line.
struct Progress {
    enabled: bool,
    on_fetch_line: bool,
}

impl Progress {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            on_fetch_line: false,
        }
    }

    fn show(&mut self, event: &SyncEvent) {
        if !self.enabled {
            return;
        }
        if let SyncEvent::Fetched { current, upstream } = event {
            print!("\r  {} r{current}/r{upstream}", "fetched".cyan());
            let _ = std::io::stdout().flush();
            self.on_fetch_line = true;
            return;
        }
        self.finish_line();
        match event {
            SyncEvent::RestoringFromCache { path } => {
                println!("{} {}", "restoring".cyan(), path.display())
            }
            SyncEvent::CorruptCacheFallback { reason } => {
                println!("{} {reason}; cloning instead", "!".yellow().bold())
            }
            SyncEvent::Cloning { url } => println!("{} {url}", "cloning".cyan()),
            SyncEvent::CheckingUpstream { url } => println!("{} {url}", "checking".cyan()),
            SyncEvent::Revisions { upstream, mirrored } => {
                println!("  upstream r{upstream}, mirrored r{mirrored}")
            }
            SyncEvent::Fetching { upstream } => {
                println!("{} up to r{upstream}", "fetching".cyan())
            }
            SyncEvent::Rebasing => println!("{}", "rebasing".cyan()),
            SyncEvent::Pushing { url, branch } => {
                println!("{} {branch} to {url}", "pushing".cyan())
            }
            SyncEvent::SavingCache { path } => {
                println!("{} {}", "caching".cyan(), path.display())
            }
            SyncEvent::CacheSaveFailed { reason } => {
                println!("{} cache not saved: {reason}", "!".yellow().bold())
            }
            SyncEvent::Fetched { .. } => {}
        }
    }

    fn finish_line(&mut self) {
        if self.on_fetch_line {
            println!();
            self.on_fetch_line = false;
        }
    }
}

fn print_report(report: &SyncReport) {
    let destination = report.destination.bold();
    match &report.outcome {
        SyncOutcome::UpToDate { revision } => {
            println!("{} {destination} is up to date at r{revision}", "✓".green())
        }
        SyncOutcome::Synced {
            previous,
            current,
            fetched,
        } => println!(
            "{} {destination} synced r{previous} -> r{current} ({fetched} revision(s))",
            "✓".green()
        ),
        SyncOutcome::WouldSync { mirrored, upstream } => println!(
            "{} {destination} is behind: mirrored r{mirrored}, upstream r{upstream}",
            "~".yellow()
        ),
    }
    match &report.cache {
        CacheUpdate::Saved { path } => println!("  cache: {}", path.display()),
        CacheUpdate::Failed { reason } => {
            println!("  {} cache not updated: {reason}", "!".yellow().bold())
        }
        CacheUpdate::Disabled | CacheUpdate::Unchanged => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnmirror_core::config::{DEFAULT_BRANCH, DEFAULT_HOST};
    use tempfile::TempDir;

    fn home_with_config(yaml: &str) -> TempDir {
        let home = TempDir::new().unwrap();
        let path = config::config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, yaml).unwrap();
        home
    }

    #[test]
    fn no_config_and_no_flags_gives_defaults() {
        let home = TempDir::new().unwrap();
        let (cache_dir, options) = SyncFlags::default().resolve_at(home.path()).unwrap();
        assert!(cache_dir.is_none());
        assert_eq!(options.host, DEFAULT_HOST);
        assert_eq!(options.branch, DEFAULT_BRANCH);
        assert_eq!(options.corrupt_cache, CorruptCachePolicy::Fail);
    }

    #[test]
    fn config_file_values_apply() {
        let home = home_with_config(
            "cache_dir: /srv/snapshots\nhost: git.example.org\nfallback_on_corrupt_cache: true\n",
        );
        let (cache_dir, options) = SyncFlags::default().resolve_at(home.path()).unwrap();
        assert_eq!(cache_dir, Some(PathBuf::from("/srv/snapshots")));
        assert_eq!(options.host, "git.example.org");
        assert_eq!(options.branch, DEFAULT_BRANCH);
        assert_eq!(options.corrupt_cache, CorruptCachePolicy::FreshClone);
    }

    #[test]
    fn flags_override_config_file() {
        let home = home_with_config("cache_dir: /srv/snapshots\nhost: git.example.org\n");
        let flags = SyncFlags {
            cache_dir: Some("/tmp/other".into()),
            host: Some("gitlab.com".into()),
            branch: Some("trunk".into()),
            ..SyncFlags::default()
        };
        let (cache_dir, options) = flags.resolve_at(home.path()).unwrap();
        assert_eq!(cache_dir, Some(PathBuf::from("/tmp/other")));
        assert_eq!(options.host, "gitlab.com");
        assert_eq!(options.branch, "trunk");
        assert!(!options.dry_run);
    }
}
