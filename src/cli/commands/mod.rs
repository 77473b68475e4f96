//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Bucket commands are async because they involve network I/O. Each handler
//! builds a `tokio::runtime::Runtime` and blocks on it, so dispatch itself
//! stays synchronous.

mod bucket_ls;
mod completion;

pub use bucket_ls::{bucket_ls, LsPlan};
pub use completion::completion;

use anyhow::Result;

use super::args::{BucketCommand, Command};

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Bucket(args) => match &args.command {
            BucketCommand::Ls { output, prefix } => bucket_ls(&args, output, prefix),
        },
        Command::Completion { shell } => completion(shell, &mut std::io::stdout()),
    }
}
