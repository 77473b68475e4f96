//! ui
//!
//! User-facing diagnostics.
//!
//! # Modules
//!
//! - [`output`] - Verbosity, logging setup and error display

pub mod output;
