//! blockscope - Inspect block metadata stored in object storage
//!
//! blockscope lists the blocks under a bucket prefix and prints, for each
//! one, its name, its `meta.json` document re-encoded as canonical JSON, or
//! a user template applied to that document. Every document printed has
//! been decoded and validated first.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, dispatches commands)
//! - [`inspect`] - Walk, fetch, validate and render pipeline
//! - [`core`] - Block metadata model, entry names, configuration
//! - [`objstore`] - Bucket abstraction with GCS, filesystem and memory backends
//! - [`ui`] - Logging and error display
//!
//! # Invariants
//!
//! 1. Blocks are printed in the order the bucket lists them
//! 2. Only metadata that decodes and validates is ever printed
//! 3. The first failure stops the listing; nothing is retried
//! 4. The bucket is never written to

pub mod cli;
pub mod core;
pub mod inspect;
pub mod objstore;
pub mod ui;
