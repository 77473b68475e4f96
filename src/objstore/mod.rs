//! objstore
//!
//! Read-only access to object storage buckets.
//!
//! # Architecture
//!
//! The `Bucket` trait defines paged one-level listing and streamed reads.
//! Commands use the [`create_bucket`] factory function rather than importing
//! specific backends directly.
//!
//! # Modules
//!
//! - `traits`: Core `Bucket` and `ObjectReader` traits, `BucketError`
//! - [`gcs`]: Google Cloud Storage JSON API
//! - [`filesystem`]: Local directory treated as a bucket
//! - [`memory`]: In-memory bucket for deterministic testing
//! - `factory`: Provider selection and creation
//!
//! # Example
//!
//! ```ignore
//! use blockscope::objstore::{create_bucket, read_all, BucketConfig, BucketProvider};
//!
//! let bucket = create_bucket(&BucketConfig {
//!     provider: BucketProvider::Filesystem,
//!     bucket: "/var/blocks".into(),
//!     gcs_endpoint: None,
//!     gcs_token: None,
//! })?;
//!
//! let mut reader = bucket.get("01ABC/meta.json").await?;
//! let bytes = read_all(reader.as_mut()).await?;
//! ```

mod factory;
pub mod filesystem;
pub mod gcs;
pub mod memory;
mod traits;

pub use factory::{create_bucket, valid_provider_names, BucketConfig, BucketProvider};
pub use traits::*;
