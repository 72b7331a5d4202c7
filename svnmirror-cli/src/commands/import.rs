//! `svnmirror import`: first-time import into an empty destination.

use anyhow::Result;
use clap::Args;

use svnmirror_core::DestinationIdentity;
use svnmirror_sync::SyncRequest;

use super::SyncFlags;

/// Arguments for `svnmirror import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Destination repository as `owner/name`. Must have no branches yet.
    pub destination: DestinationIdentity,

    /// Upstream repository URL, e.g. `https://svn.example.org/repos/widget`.
    pub source_url: String,

    #[command(flatten)]
    pub flags: SyncFlags,
}

impl ImportArgs {
    pub fn run(self) -> Result<()> {
        let request = SyncRequest::import(self.destination, self.source_url);
        super::execute(request, &self.flags, false)
    }
}
