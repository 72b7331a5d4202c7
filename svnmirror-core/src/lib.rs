//! svnmirror core library: domain types, configuration, errors.
//!
//! - [`types`]: destination identity, revisions, [`MirrorState`] and its trailer format
//! - [`error`]: [`ConfigError`]
//! - [`config`]: loading of `~/.svnmirror/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::MirrorConfig;
pub use error::ConfigError;
pub use types::{
    DestinationIdentity, InvalidIdentity, MirrorState, Revision, SourceInstanceId,
    SOURCE_TRAILER_KEY,
};
