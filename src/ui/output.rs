//! ui::output
//!
//! Diagnostics and logging setup.
//!
//! # Design
//!
//! Stdout carries only rendered blocks. Everything else goes to stderr:
//! tracing events filtered by verbosity, and the final error message.

use std::fmt::Display;

use tracing::Level;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - errors only
    Quiet,
    /// Normal mode - warnings and errors
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Most verbose tracing level shown at this verbosity.
    pub fn max_level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::WARN,
            Verbosity::Debug => Level::DEBUG,
        }
    }
}

/// Install the global tracing subscriber, writing to stderr.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(verbosity: Verbosity) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(verbosity.max_level())
        .with_target(verbosity == Verbosity::Debug)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_debug() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn levels() {
        assert_eq!(Verbosity::Quiet.max_level(), Level::ERROR);
        assert_eq!(Verbosity::Normal.max_level(), Level::WARN);
        assert_eq!(Verbosity::Debug.max_level(), Level::DEBUG);
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Debug);
    }
}
