//! `svnmirror update`: push new upstream revisions to the destination.

use anyhow::Result;
use clap::Args;

use svnmirror_core::DestinationIdentity;
use svnmirror_sync::SyncRequest;

use super::SyncFlags;

/// Arguments for `svnmirror update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Destination repository as `owner/name`.
    pub destination: DestinationIdentity,

    #[command(flatten)]
    pub flags: SyncFlags,
}

impl UpdateArgs {
    pub fn run(self) -> Result<()> {
        super::execute(SyncRequest::update(self.destination), &self.flags, false)
    }
}
