//! Snapshot cache: one archive of the mirror's metadata store per destination.
//!
//! Artifacts live at `<cache_dir>/cache.<owner>.<name>.tar`. Saves go to a
//! temporary sibling first and are renamed into place, so an interrupted save
//! never replaces a good artifact with a partial one.
//!
//! Two runs against the same destination must not share a cache directory
//! concurrently; nothing here locks the artifact.

use std::path::{Path, PathBuf};

use svnmirror_core::DestinationIdentity;

use crate::archive::Archiver;
use crate::error::{io_err, SyncError};

pub struct SnapshotCache<'a> {
    root: PathBuf,
    archiver: &'a dyn Archiver,
}

impl<'a> SnapshotCache<'a> {
    /// Open the cache rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, archiver: &'a dyn Archiver) -> Result<Self, SyncError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root, archiver })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/cache.<owner>.<name>.tar`: pure, no I/O.
    pub fn entry_path(&self, destination: &DestinationIdentity) -> PathBuf {
        self.root.join(destination.cache_file_name())
    }

    pub fn exists(&self, destination: &DestinationIdentity) -> bool {
        self.entry_path(destination).is_file()
    }

    /// Extract the snapshot for `destination` into `target`.
    ///
    /// A snapshot that cannot be read yields `SyncError::CorruptCache`; the
    /// caller decides whether to fall back to a fresh clone.
    pub fn restore(
        &self,
        destination: &DestinationIdentity,
        target: &Path,
    ) -> Result<(), SyncError> {
        let path = self.entry_path(destination);
        if !path.is_file() {
            return Err(io_err(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no cache artifact"),
            ));
        }
        tracing::info!("restoring {} from {}", destination, path.display());
        let corrupt = |reason: String| SyncError::CorruptCache {
            path: path.clone(),
            reason,
        };
        self.archiver
            .unpack(&path, target)
            .map_err(|e| corrupt(e.to_string()))?;

        // An empty or header-only archive unpacks cleanly but restores nothing.
        let mut restored = std::fs::read_dir(target).map_err(|e| io_err(target, e))?;
        if restored.next().is_none() {
            return Err(corrupt("archive contains no entries".to_owned()));
        }
        Ok(())
    }

    /// Archive `source` and atomically replace the snapshot for `destination`.
    ///
    /// Returns the artifact path.
    pub fn save(
        &self,
        destination: &DestinationIdentity,
        source: &Path,
    ) -> Result<PathBuf, SyncError> {
        let path = self.entry_path(destination);
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", destination.cache_file_name()))
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| io_err(&self.root, e))?;

        // On error the temporary file is removed when `tmp` drops.
        self.archiver.pack(source, tmp.as_file_mut())?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;

        tracing::info!("saved {} snapshot to {}", destination, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarArchiver;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn widget() -> DestinationIdentity {
        "acme/widget".parse().unwrap()
    }

    fn metadata_dir(contents: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("HEAD"), contents).unwrap();
        dir
    }

    /// Writes some bytes and then fails, like a save killed mid-way.
    struct FailingArchiver;

    impl Archiver for FailingArchiver {
        fn pack(&self, dir: &Path, out: &mut File) -> Result<(), SyncError> {
            out.write_all(b"partial").map_err(|e| io_err(dir, e))?;
            Err(io_err(dir, std::io::Error::other("disk full")))
        }

        fn unpack(&self, archive: &Path, _dir: &Path) -> Result<(), SyncError> {
            Err(io_err(archive, std::io::Error::other("unsupported")))
        }
    }

    #[test]
    fn entry_path_is_named_after_destination() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        assert_eq!(cache.entry_path(&widget()), root.path().join("cache.acme.widget.tar"));
        assert!(!cache.exists(&widget()));
    }

    #[test]
    fn open_creates_missing_root() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a").join("b");
        let cache = SnapshotCache::open(&nested, &TarArchiver).unwrap();
        assert!(cache.root().is_dir());
    }

    #[test]
    fn save_then_restore_roundtrip() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        let source = metadata_dir("ref: refs/heads/master\n");

        let saved = cache.save(&widget(), source.path()).unwrap();
        assert!(saved.is_file());
        assert!(cache.exists(&widget()));

        let target = TempDir::new().unwrap();
        cache.restore(&widget(), target.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(target.path().join("HEAD")).unwrap(),
            "ref: refs/heads/master\n"
        );
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        cache.save(&widget(), metadata_dir("one\n").path()).unwrap();
        cache.save(&widget(), metadata_dir("two\n").path()).unwrap();

        let target = TempDir::new().unwrap();
        cache.restore(&widget(), target.path()).unwrap();
        assert_eq!(std::fs::read_to_string(target.path().join("HEAD")).unwrap(), "two\n");
    }

    #[test]
    fn interrupted_save_keeps_previous_snapshot_and_leaves_no_tmp() {
        let root = TempDir::new().unwrap();
        let good = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        let path = good.save(&widget(), metadata_dir("good\n").path()).unwrap();
        let before = std::fs::read(&path).unwrap();

        let failing = SnapshotCache::open(root.path(), &FailingArchiver).unwrap();
        assert!(failing.save(&widget(), metadata_dir("bad\n").path()).is_err());

        assert_eq!(std::fs::read(&path).unwrap(), before);
        let leftovers: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "tmp files left behind: {leftovers:?}");

        let target = TempDir::new().unwrap();
        good.restore(&widget(), target.path()).unwrap();
        assert_eq!(std::fs::read_to_string(target.path().join("HEAD")).unwrap(), "good\n");
    }

    #[test]
    fn restoring_garbage_is_corrupt_cache() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        std::fs::write(cache.entry_path(&widget()), vec![b'A'; 1024]).unwrap();

        let target = TempDir::new().unwrap();
        let err = cache.restore(&widget(), target.path()).unwrap_err();
        assert!(matches!(err, SyncError::CorruptCache { .. }), "got: {err}");
    }

    #[test]
    fn restoring_empty_artifact_is_corrupt_cache() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        // Zero bytes, and a bare end-of-archive marker.
        for contents in [Vec::new(), vec![0u8; 1024]] {
            std::fs::write(cache.entry_path(&widget()), contents).unwrap();
            let target = TempDir::new().unwrap();
            let err = cache.restore(&widget(), target.path()).unwrap_err();
            assert!(matches!(err, SyncError::CorruptCache { .. }), "got: {err}");
        }
    }

    #[test]
    fn restoring_missing_artifact_is_io_error() {
        let root = TempDir::new().unwrap();
        let cache = SnapshotCache::open(root.path(), &TarArchiver).unwrap();
        let target = TempDir::new().unwrap();
        let err = cache.restore(&widget(), target.path()).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }
}
