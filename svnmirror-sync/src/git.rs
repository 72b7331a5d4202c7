//! Version-control client seam used by the local mirror.
//!
//! [`GitClient`] is the narrow interface over the destination client
//! (clone, push) and the upstream bridge (init, fetch, rebase). [`GitCli`]
//! implements it by running `git` and `git svn`.

use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Output, Stdio};

use svnmirror_core::Revision;

use crate::error::SyncError;

/// Lazily realized sequence of revisions pulled from upstream.
///
/// Each element is produced only once the underlying pull reports it. A
/// failed pull ends the sequence with `Err`.
pub type FetchStream<'a> = Box<dyn Iterator<Item = Result<Revision, SyncError>> + 'a>;

/// Operations the local mirror needs from a version-control client.
///
/// Every method works on the working copy rooted at `dir`.
pub trait GitClient {
    /// Clone `url` into the existing, empty directory `dir`.
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), SyncError>;

    /// Rebuild the checked-out files from a restored metadata store.
    fn checkout_worktree(&self, dir: &Path) -> Result<(), SyncError>;

    /// Whether any branch reference exists.
    fn has_branches(&self, dir: &Path) -> Result<bool, SyncError>;

    /// Body of the newest commit's message, or `None` without commits.
    fn head_commit_body(&self, dir: &Path) -> Result<Option<String>, SyncError>;

    /// Upstream URL the working copy is linked to, if any.
    fn linked_source(&self, dir: &Path) -> Result<Option<String>, SyncError>;

    /// Link the working copy to `url`, adopting `instance_id` when given.
    fn link_source(&self, dir: &Path, url: &str, instance_id: Option<&str>)
        -> Result<(), SyncError>;

    /// Start pulling new upstream revisions.
    fn fetch<'a>(&'a self, dir: &'a Path) -> Result<FetchStream<'a>, SyncError>;

    /// Replay pulled revisions onto the local branch tip.
    fn rebase(&self, dir: &Path) -> Result<(), SyncError>;

    /// Push `branch` to `url`.
    fn push(&self, dir: &Path, url: &str, branch: &str) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

/// [`GitClient`] backed by the `git` executable (with `git-svn`).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    /// Use a specific `git` executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        tracing::debug!("git {} (in {})", args.join(" "), dir.display());
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Run git to completion, capturing output. Exit status is not checked.
    fn output(&self, dir: &Path, args: &[&str]) -> Result<Output, SyncError> {
        self.command(dir, args)
            .output()
            .map_err(|e| SyncError::Command {
                command: format!("git {}", args.join(" ")),
                message: e.to_string(),
            })
    }

    /// Run git and map a non-zero exit through `on_failure`.
    fn run(
        &self,
        dir: &Path,
        args: &[&str],
        on_failure: impl FnOnce(String) -> SyncError,
    ) -> Result<Output, SyncError> {
        let output = self.output(dir, args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(on_failure(failure_message(output.status, &output.stderr)))
        }
    }

    fn command_failed<'a>(args: &'a [&'a str]) -> impl FnOnce(String) -> SyncError + 'a {
        move |message| SyncError::Command {
            command: format!("git {}", args.join(" ")),
            message,
        }
    }
}

impl GitClient for GitCli {
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), SyncError> {
        let args = ["clone", url, "."];
        self.run(dir, &args, GitCli::command_failed(&args))?;
        Ok(())
    }

    fn checkout_worktree(&self, dir: &Path) -> Result<(), SyncError> {
        let config = ["config", "core.bare", "false"];
        self.run(dir, &config, GitCli::command_failed(&config))?;
        if self.head_commit_body(dir)?.is_some() {
            let checkout = ["checkout", "."];
            self.run(dir, &checkout, GitCli::command_failed(&checkout))?;
        }
        Ok(())
    }

    fn has_branches(&self, dir: &Path) -> Result<bool, SyncError> {
        let args = ["for-each-ref", "--count=1", "--format=%(refname)", "refs/heads"];
        let output = self.run(dir, &args, GitCli::command_failed(&args))?;
        Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
    }

    fn head_commit_body(&self, dir: &Path) -> Result<Option<String>, SyncError> {
        let verify = self.output(dir, &["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !verify.status.success() {
            return Ok(None);
        }
        let args = ["log", "-1", "HEAD", "--pretty=%b"];
        let output = self.run(dir, &args, GitCli::command_failed(&args))?;
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn linked_source(&self, dir: &Path) -> Result<Option<String>, SyncError> {
        // `git config --get` exits 1 when the key is unset.
        let output = self.output(dir, &["config", "--get", "svn-remote.svn.url"])?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_owned(),
            )),
            Some(1) => Ok(None),
            _ => Err(SyncError::Command {
                command: "git config --get svn-remote.svn.url".to_owned(),
                message: failure_message(output.status, &output.stderr),
            }),
        }
    }

    fn link_source(
        &self,
        dir: &Path,
        url: &str,
        instance_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let mut args = vec!["svn", "init"];
        if let Some(id) = instance_id {
            args.extend(["--rewrite-uuid", id]);
        }
        args.push(url);
        self.run(dir, &args, GitCli::command_failed(&args))?;
        Ok(())
    }

    fn fetch<'a>(&'a self, dir: &'a Path) -> Result<FetchStream<'a>, SyncError> {
        let mut child = self
            .command(dir, &["svn", "fetch"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SyncError::FetchFailed {
                reason: format!("cannot start git svn fetch: {e}"),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| SyncError::FetchFailed {
            reason: "git svn fetch has no stdout".to_owned(),
        })?;
        Ok(Box::new(FetchLines {
            lines: BufReader::new(stdout).lines(),
            child,
            finished: false,
        }))
    }

    fn rebase(&self, dir: &Path) -> Result<(), SyncError> {
        self.run(dir, &["svn", "rebase"], |reason| SyncError::RebaseFailed {
            reason,
        })?;
        Ok(())
    }

    fn push(&self, dir: &Path, url: &str, branch: &str) -> Result<(), SyncError> {
        self.run(dir, &["push", url, branch], |reason| SyncError::PushRejected {
            url: url.to_owned(),
            reason,
        })?;
        Ok(())
    }
}

fn failure_message(status: ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {stderr}")
    }
}

// ---------------------------------------------------------------------------
// Streaming fetch
// ---------------------------------------------------------------------------

/// Iterator over `git svn fetch` progress lines.
struct FetchLines {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    finished: bool,
}

impl Iterator for FetchLines {
    type Item = Result<Revision, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(rev) = parse_fetch_line(&line) {
                        return Some(Ok(rev));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    return Some(Err(SyncError::FetchFailed {
                        reason: format!("reading git svn fetch output: {e}"),
                    }));
                }
                None => {
                    self.finished = true;
                    return match self.child.wait() {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some(Err(SyncError::FetchFailed {
                            reason: format!("git svn fetch exited with {status}"),
                        })),
                        Err(e) => Some(Err(SyncError::FetchFailed {
                            reason: format!("waiting for git svn fetch: {e}"),
                        })),
                    };
                }
            }
        }
    }
}

impl Drop for FetchLines {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Parse a `git svn fetch` progress line: `r<rev> = <40 hex digits> ...`.
pub fn parse_fetch_line(line: &str) -> Option<Revision> {
    let (rev, rest) = line.strip_prefix('r')?.split_once(" = ")?;
    if rev.is_empty() || !rev.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hash = rest.get(..40)?;
    if !hash.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        return None;
    }
    rev.parse().ok()
}
