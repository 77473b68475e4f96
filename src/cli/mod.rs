//! cli
//!
//! Command-line interface layer for blockscope.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging at the requested verbosity
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and hands off to
//! [`crate::inspect`] for the actual work. Library errors are converted to
//! `anyhow::Error` here and reported by `main`.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;

use crate::ui::output::{init_logging, Verbosity};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(Verbosity::from_flags(cli.quiet, cli.debug));

    commands::dispatch(cli.command)
}
