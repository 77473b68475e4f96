//! objstore::traits
//!
//! Bucket trait definition for read access to object storage.
//!
//! # Design
//!
//! The `Bucket` trait is async because bucket operations involve network or
//! disk I/O. All methods return `Result` so backend failures propagate to the
//! caller; implementations do not retry.
//!
//! Listing is paged and one level deep: a page holds the immediate children
//! of a directory key. Child directories end in `/`.
//!
//! # Example
//!
//! ```ignore
//! use blockscope::objstore::{Bucket, BucketError};
//!
//! async fn first_page(bucket: &dyn Bucket) -> Result<Vec<String>, BucketError> {
//!     let page = bucket.list_page("", None).await?;
//!     Ok(page.entries)
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from bucket operations.
///
/// These map to the common failure modes of object storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Credentials are missing, invalid, or lack permission.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The backend API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// The bucket could not be configured.
    #[error("invalid bucket configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for BucketError {
    fn from(err: std::io::Error) -> Self {
        BucketError::Io(err.to_string())
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Child entry names, relative to the bucket root
    pub entries: Vec<String>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

impl ListPage {
    /// A single, final page.
    pub fn last(entries: Vec<String>) -> Self {
        Self {
            entries,
            next_page_token: None,
        }
    }

    /// Check if more pages follow.
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

/// An open object read stream.
///
/// Dropping the reader releases the underlying handle.
#[async_trait]
pub trait ObjectReader: Send {
    /// Read the next chunk of the object, `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BucketError>;
}

/// Read-only access to an object storage bucket.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one bucket handle is shared by all
/// reads of a walk.
///
/// # Error Handling
///
/// All methods return `Result<T, BucketError>`. Callers should handle:
/// - `NotFound`: object missing
/// - `AccessDenied`: credentials problem
/// - `ApiError` / `NetworkError` / `Io`: backend failure
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Get the bucket name (for diagnostics).
    fn name(&self) -> &str;

    /// List one page of the immediate children of `dir`.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory key: empty for the root, otherwise ending in `/`
    /// * `page_token` - Token from the previous page, `None` for the first
    ///
    /// # Returns
    ///
    /// Entry names relative to the bucket root, in backend order. Child
    /// directories end in `/`.
    async fn list_page(&self, dir: &str, page_token: Option<&str>)
        -> Result<ListPage, BucketError>;

    /// Open a read stream for the object at `path`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the object doesn't exist
    /// - `AccessDenied` if lacking permission to read it
    async fn get(&self, path: &str) -> Result<Box<dyn ObjectReader>, BucketError>;
}

/// Drain a reader into memory.
pub async fn read_all(reader: &mut dyn ObjectReader) -> Result<Vec<u8>, BucketError> {
    let mut buf = Vec::new();
    while let Some(chunk) = reader.next_chunk().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
