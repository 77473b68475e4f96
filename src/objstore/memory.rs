//! objstore::memory
//!
//! In-memory bucket for deterministic testing and embedding.
//!
//! # Design
//!
//! Objects are held in a sorted map keyed by path. Directory listings are
//! derived from the keys, one level deep, exactly as an object store with a
//! `/` delimiter would report them. Tests can additionally:
//!
//! - pin the listing order of a directory ([`MemoryBucket::set_listing`])
//! - force small pages ([`MemoryBucket::with_page_size`])
//! - inject failures ([`FailOn`])
//! - inspect recorded operations ([`MockOperation`])
//! - verify that every opened reader was released ([`MemoryBucket::open_readers`])
//!
//! # Example
//!
//! ```
//! use blockscope::objstore::memory::MemoryBucket;
//! use blockscope::objstore::{read_all, Bucket};
//!
//! # tokio_test::block_on(async {
//! let bucket = MemoryBucket::new("test")
//!     .with_object("01ABC/meta.json", r#"{"ulid":"01ABC"}"#)
//!     .with_object("01DEF/meta.json", r#"{"ulid":"01DEF"}"#);
//!
//! let page = bucket.list_page("", None).await.unwrap();
//! assert_eq!(page.entries, vec!["01ABC/", "01DEF/"]);
//!
//! let mut reader = bucket.get("01ABC/meta.json").await.unwrap();
//! let data = read_all(reader.as_mut()).await.unwrap();
//! assert_eq!(data, br#"{"ulid":"01ABC"}"#);
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::traits::{Bucket, BucketError, ListPage, ObjectReader};

/// Size of the chunks handed out by memory readers.
const CHUNK_SIZE: usize = 1024;

/// In-memory bucket.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    /// Internal state shared across clones.
    inner: Arc<Mutex<MemoryBucketInner>>,
    /// Readers currently open.
    open_readers: Arc<AtomicUsize>,
}

/// Internal mutable state.
#[derive(Debug, Default)]
struct MemoryBucketInner {
    /// Stored objects by path.
    objects: BTreeMap<String, Bytes>,
    /// Listing order overrides by directory.
    listings: HashMap<String, Vec<String>>,
    /// Maximum entries per listing page.
    page_size: Option<usize>,
    /// Failures to inject.
    fail_on: Vec<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail every list_page call with the given error.
    List(BucketError),
    /// Fail get for the given path with the given error.
    Get { path: String, error: BucketError },
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    List {
        dir: String,
        page_token: Option<String>,
    },
    Get {
        path: String,
    },
}

impl MockOperation {
    /// Check if this is a listing call.
    pub fn is_list(&self) -> bool {
        matches!(self, MockOperation::List { .. })
    }

    /// Check if this is a read call.
    pub fn is_get(&self) -> bool {
        matches!(self, MockOperation::Get { .. })
    }
}

impl MemoryBucket {
    /// Create a new empty bucket.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MemoryBucketInner::default())),
            open_readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add an object (builder style).
    pub fn with_object(self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.put(path, data);
        self
    }

    /// Limit listing pages to `size` entries (builder style).
    pub fn with_page_size(self, size: usize) -> Self {
        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.page_size = Some(size.max(1));
        }
        self
    }

    /// Configure the bucket to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use blockscope::objstore::memory::{FailOn, MemoryBucket};
    /// use blockscope::objstore::BucketError;
    ///
    /// let bucket = MemoryBucket::new("test")
    ///     .fail_on(FailOn::List(BucketError::NetworkError("down".into())));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.fail_on.push(fail_on);
        }
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.fail_on.clear();
    }

    /// Store an object, replacing any existing one.
    pub fn put(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.objects.insert(path.into(), data.into());
    }

    /// Pin the entries (and their order) reported when listing `dir`.
    pub fn set_listing(&self, dir: impl Into<String>, entries: Vec<String>) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.listings.insert(dir.into(), entries);
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.operations.clear();
    }

    /// Paths read so far, in order.
    pub fn gets(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::Get { path } => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Number of readers opened and not yet dropped.
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Get the count of stored objects.
    pub fn object_count(&self) -> usize {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.objects.len()
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.operations.push(op);
    }

    /// Check if a listing should fail.
    fn check_list_fail(&self) -> Option<BucketError> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.fail_on.iter().find_map(|f| match f {
            FailOn::List(e) => Some(e.clone()),
            _ => None,
        })
    }

    /// Check if a read of `path` should fail.
    fn check_get_fail(&self, path: &str) -> Option<BucketError> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.fail_on.iter().find_map(|f| match f {
            FailOn::Get { path: p, error } if p == path => Some(error.clone()),
            _ => None,
        })
    }

    /// Compute the immediate children of `dir` from stored keys.
    fn children(objects: &BTreeMap<String, Bytes>, dir: &str) -> Vec<String> {
        let mut children = BTreeSet::new();
        for key in objects.keys() {
            let Some(rest) = key.strip_prefix(dir) else {
                continue;
            };
            if rest.is_empty() {
                // Directory placeholder object
                continue;
            }
            match rest.find('/') {
                Some(idx) => children.insert(format!("{}{}", dir, &rest[..=idx])),
                None => children.insert(key.clone()),
            };
        }
        children.into_iter().collect()
    }
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        dir: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BucketError> {
        self.record(MockOperation::List {
            dir: dir.to_string(),
            page_token: page_token.map(str::to_string),
        });

        if let Some(err) = self.check_list_fail() {
            return Err(err);
        }

        let inner = self.inner.lock().expect("lock poisoned");
        let entries = match inner.listings.get(dir) {
            Some(pinned) => pinned.clone(),
            None => Self::children(&inner.objects, dir),
        };

        let start = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| BucketError::ApiError {
                status: 400,
                message: format!("invalid page token '{}'", token),
            })?,
            None => 0,
        };
        let page_size = inner.page_size.unwrap_or(usize::MAX);
        let end = start.saturating_add(page_size).min(entries.len());
        let start = start.min(end);

        Ok(ListPage {
            entries: entries[start..end].to_vec(),
            next_page_token: (end < entries.len()).then(|| end.to_string()),
        })
    }

    async fn get(&self, path: &str) -> Result<Box<dyn ObjectReader>, BucketError> {
        self.record(MockOperation::Get {
            path: path.to_string(),
        });

        if let Some(err) = self.check_get_fail(path) {
            return Err(err);
        }

        let data = {
            let inner = self.inner.lock().expect("lock poisoned");
            inner
                .objects
                .get(path)
                .cloned()
                .ok_or_else(|| BucketError::NotFound(path.to_string()))?
        };

        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryReader {
            data,
            open_readers: Arc::clone(&self.open_readers),
        }))
    }
}

/// Reader over an in-memory object; decrements the open count on drop.
struct MemoryReader {
    data: Bytes,
    open_readers: Arc<AtomicUsize>,
}

#[async_trait]
impl ObjectReader for MemoryReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BucketError> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = CHUNK_SIZE.min(self.data.len());
        Ok(Some(self.data.split_to(n)))
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}
