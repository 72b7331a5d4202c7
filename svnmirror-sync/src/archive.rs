//! Archive seam: packs a directory into one file and back.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{io_err, SyncError};

/// Packs a directory tree into a single file and unpacks it again.
pub trait Archiver {
    /// Write the contents of `dir` into the open file `out`.
    fn pack(&self, dir: &Path, out: &mut File) -> Result<(), SyncError>;

    /// Extract `archive` into the existing directory `dir`.
    fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), SyncError>;
}

/// Uncompressed tar archives via the `tar` crate.
///
/// Symlinks are stored as links, not followed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiver;

impl Archiver for TarArchiver {
    fn pack(&self, dir: &Path, out: &mut File) -> Result<(), SyncError> {
        tracing::debug!("packing {}", dir.display());
        let mut builder = tar::Builder::new(BufWriter::new(&mut *out));
        builder.follow_symlinks(false);
        builder
            .append_dir_all(".", dir)
            .map_err(|e| io_err(dir, e))?;
        let mut writer = builder.into_inner().map_err(|e| io_err(dir, e))?;
        writer.flush().map_err(|e| io_err(dir, e))?;
        drop(writer);
        out.sync_all().map_err(|e| io_err(dir, e))
    }

    fn unpack(&self, archive: &Path, dir: &Path) -> Result<(), SyncError> {
        tracing::debug!("unpacking {} into {}", archive.display(), dir.display());
        let file = File::open(archive).map_err(|e| io_err(archive, e))?;
        let mut archive_reader = tar::Archive::new(file);
        archive_reader.set_preserve_permissions(true);
        archive_reader.unpack(dir).map_err(|e| io_err(archive, e))
    }
}
