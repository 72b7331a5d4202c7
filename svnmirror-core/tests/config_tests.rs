//! Config loading: defaults, partial files and error messages.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::path::PathBuf;
use svnmirror_core::{config, ConfigError, MirrorConfig};

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

#[test]
fn partial_file_fills_in_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".svnmirror/config.yaml")
        .write_str("cache_dir: /srv/mirror-cache\n")
        .expect("write");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.cache_dir, Some(PathBuf::from("/srv/mirror-cache")));
    assert_eq!(loaded.host, "github.com");
    assert_eq!(loaded.branch, "master");
    assert!(!loaded.fallback_on_corrupt_cache);
}

#[test]
fn empty_file_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".svnmirror/config.yaml").write_str("\n").expect("write");
    assert_eq!(config::load_at(home.path()).expect("load"), MirrorConfig::default());
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".svnmirror/config.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must contain file path, got: {err}");
}

#[test]
fn wrong_field_type_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".svnmirror/config.yaml")
        .write_str("fallback_on_corrupt_cache: [1, 2]\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Layout
// ---------------------------------------------------------------------------

#[test]
fn loading_never_creates_files() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    assert_eq!(config::load_at(home.path()).expect("load"), MirrorConfig::default());
    home.child(".svnmirror").assert(predicate::path::missing());
}

#[test]
fn unknown_keys_are_ignored() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".svnmirror/config.yaml")
        .write_str("branch: trunk\nretries: 3\n")
        .expect("write");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.branch, "trunk");
    assert_eq!(loaded.host, "github.com");
}

#[test]
fn unreadable_path_is_io_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    // A directory where the file should be.
    home.child(".svnmirror/config.yaml").create_dir_all().expect("mkdir");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)), "got: {err}");
    assert!(config::config_path_at(home.path()).is_dir());
}
