//! svnmirror: mirror a Subversion repository into a hosted git repository.
//!
//! # Usage
//!
//! ```text
//! svnmirror import <owner/name> <source-url> [--cache-dir DIR]
//! svnmirror update <owner/name> [--cache-dir DIR]
//! svnmirror status <owner/name> [--cache-dir DIR] [--json]
//! ```
//!
//! Every command also takes `--host`, `--branch` and
//! `--fallback-on-corrupt-cache`, overriding `~/.svnmirror/config.yaml`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{import::ImportArgs, status::StatusArgs, update::UpdateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "svnmirror",
    version,
    about = "Mirror Subversion history into a hosted git repository",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// First-time import of an upstream repository into an empty destination.
    Import(ImportArgs),

    /// Push new upstream revisions to an already imported destination.
    Update(UpdateArgs),

    /// Compare the destination with upstream without changing anything.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Import(args) => args.run(),
        Commands::Update(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
