//! `svnmirror status`: how far the destination trails upstream.
//!
//! Restores or clones the working copy and queries upstream, then stops.
//! Nothing is fetched, pushed or cached.

use anyhow::Result;
use clap::Args;

use svnmirror_core::DestinationIdentity;
use svnmirror_sync::SyncRequest;

use super::SyncFlags;

/// Arguments for `svnmirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Destination repository as `owner/name`.
    pub destination: DestinationIdentity,

    #[command(flatten)]
    pub flags: SyncFlags,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        super::execute(SyncRequest::update(self.destination), &self.flags, true)
    }
}
