//! Domain types for the mirror.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Types that appear in reports are serializable via serde.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An upstream revision number. Revisions only ever grow.
pub type Revision = u64;

/// Key of the history trailer line that records the last synced upstream
/// revision, e.g. `git-svn-id: https://svn.example.org/widget@42 <uuid>`.
pub const SOURCE_TRAILER_KEY: &str = "git-svn-id";

/// Length of a source instance identifier (a dashed UUID).
const INSTANCE_ID_LEN: usize = 36;

/// Identity of a hosted destination repository in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationIdentity {
    owner: String,
    name: String,
}

impl DestinationIdentity {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// SSH remote address on `host`, e.g. `git@github.com:acme/widget.git`.
    pub fn remote_url(&self, host: &str) -> String {
        format!("git@{host}:{}/{}.git", self.owner, self.name)
    }

    /// Deterministic file name of this destination's snapshot artifact.
    pub fn cache_file_name(&self) -> String {
        format!("cache.{}.{}.tar", self.owner, self.name)
    }
}

impl fmt::Display for DestinationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Reason a string could not be parsed as a [`DestinationIdentity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentity(pub String);

impl fmt::Display for InvalidIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not in owner/name form", self.0)
    }
}

impl std::error::Error for InvalidIdentity {}

impl FromStr for DestinationIdentity {
    type Err = InvalidIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid_part = |p: &str| {
            !p.is_empty()
                && p != "."
                && p != ".."
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        match s.split_once('/') {
            Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(Self {
                owner: owner.to_owned(),
                name: name.to_owned(),
            }),
            _ => Err(InvalidIdentity(s.to_owned())),
        }
    }
}

/// Identifier of the upstream repository instance (a 36-char dashed UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInstanceId(pub String);

impl SourceInstanceId {
    /// Accepts exactly 36 lowercase hex digits and dashes.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == INSTANCE_ID_LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || b == b'-');
        well_formed.then(|| Self(s.to_owned()))
    }
}

impl fmt::Display for SourceInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// MirrorState
// ---------------------------------------------------------------------------

/// Sync state derived from the newest commit of the local mirror.
///
/// Never persisted on its own: it is re-read from history every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorState {
    pub source_url: String,
    pub last_revision: Revision,
    pub source_instance_id: Option<SourceInstanceId>,
}

impl MirrorState {
    /// State for a mirror that has never pulled anything from `source_url`.
    pub fn fresh(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            last_revision: 0,
            source_instance_id: None,
        }
    }

    /// Find the source trailer in a commit message body.
    ///
    /// The first line matching `git-svn-id: <url>@<rev> <uuid>` wins.
    pub fn from_commit_body(body: &str) -> Option<Self> {
        body.lines().find_map(Self::from_trailer_line)
    }

    fn from_trailer_line(line: &str) -> Option<Self> {
        let rest = line
            .trim_end_matches('\r')
            .strip_prefix(SOURCE_TRAILER_KEY)?
            .strip_prefix(": ")?;
        let (location, instance) = rest.rsplit_once(' ')?;
        let instance = SourceInstanceId::parse(instance)?;
        let (url, revision) = location.rsplit_once('@')?;
        if url.is_empty() || revision.is_empty() || !revision.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self {
            source_url: url.to_owned(),
            last_revision: revision.parse().ok()?,
            source_instance_id: Some(instance),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "0b5a8c3e-1f2d-4e6a-9b7c-123456789abc";

    #[test]
    fn identity_parses_owner_and_name() {
        let id: DestinationIdentity = "acme/widget".parse().unwrap();
        assert_eq!(id.owner(), "acme");
        assert_eq!(id.name(), "widget");
        assert_eq!(id.to_string(), "acme/widget");
    }

    #[test]
    fn identity_rejects_malformed_input() {
        for bad in ["acme", "/widget", "acme/", "a/b/c", "acme/../x", "ac me/w"] {
            assert!(bad.parse::<DestinationIdentity>().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn identity_derives_remote_and_cache_name() {
        let id: DestinationIdentity = "acme/widget".parse().unwrap();
        assert_eq!(id.remote_url("github.com"), "git@github.com:acme/widget.git");
        assert_eq!(id.cache_file_name(), "cache.acme.widget.tar");
    }

    #[test]
    fn trailer_is_found_among_other_lines() {
        let body = format!(
            "Fix the frobnicator\n\ngit-svn-id: https://svn.example.org/widget/trunk@42 {UUID}\n"
        );
        let state = MirrorState::from_commit_body(&body).expect("trailer");
        assert_eq!(state.source_url, "https://svn.example.org/widget/trunk");
        assert_eq!(state.last_revision, 42);
        assert_eq!(state.source_instance_id, Some(SourceInstanceId(UUID.into())));
    }

    #[test]
    fn url_containing_at_sign_splits_on_last_one() {
        let body = format!("git-svn-id: svn+ssh://bob@svn.example.org/repo@7 {UUID}");
        let state = MirrorState::from_commit_body(&body).unwrap();
        assert_eq!(state.source_url, "svn+ssh://bob@svn.example.org/repo");
        assert_eq!(state.last_revision, 7);
    }

    #[test]
    fn malformed_trailers_are_ignored() {
        let cases = [
            "".to_string(),
            "no metadata here".to_string(),
            format!("git-svn-id: https://svn.example.org/x@abc {UUID}"),
            "git-svn-id: https://svn.example.org/x@3 not-a-uuid".to_string(),
            format!("  git-svn-id: https://svn.example.org/x@3 {UUID}"),
            format!("git-svn-id: @3 {UUID}"),
        ];
        for body in cases {
            assert!(MirrorState::from_commit_body(&body).is_none(), "{body}");
        }
    }

    #[test]
    fn fresh_state_starts_at_zero_without_instance() {
        let state = MirrorState::fresh("https://svn.example.org/widget");
        assert_eq!(state.last_revision, 0);
        assert!(state.source_instance_id.is_none());
    }
}
