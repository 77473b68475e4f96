//! core
//!
//! Core domain types and configuration.
//!
//! # Modules
//!
//! - [`meta`] - Block metadata document model and canonical encoding
//! - [`block`] - Block entry names and object path helpers
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Decoded metadata is read-only and always validated
//! - Encoding is deterministic

pub mod block;
pub mod config;
pub mod meta;
