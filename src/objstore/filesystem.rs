//! objstore::filesystem
//!
//! Bucket backed by a local directory.
//!
//! # Design
//!
//! The root directory plays the role of the bucket; object paths are
//! relative paths beneath it. Listings are returned as a single page in
//! lexicographic order, with subdirectories reported as `name/`.
//!
//! Paths containing `..` components are rejected so reads cannot escape the
//! root.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;

use super::traits::{Bucket, BucketError, ListPage, ObjectReader};

/// Read buffer size for file readers.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Bucket rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemBucket {
    name: String,
    root: PathBuf,
}

impl FilesystemBucket {
    /// Open a bucket rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `BucketError::InvalidConfig` if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BucketError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(BucketError::InvalidConfig(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            name: root.display().to_string(),
            root,
        })
    }

    /// Root directory of the bucket.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object key to a path under the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, BucketError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(BucketError::InvalidConfig(format!(
                "object path '{}' escapes the bucket root",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Bucket for FilesystemBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        dir: &str,
        _page_token: Option<&str>,
    ) -> Result<ListPage, BucketError> {
        let path = self.resolve(dir)?;
        let mut read_dir = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            // A missing directory is an empty listing, as in object storage.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListPage::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                entries.push(format!("{}{}/", dir, name));
            } else {
                entries.push(format!("{}{}", dir, name));
            }
        }
        entries.sort();

        Ok(ListPage::last(entries))
    }

    async fn get(&self, path: &str) -> Result<Box<dyn ObjectReader>, BucketError> {
        let full = self.resolve(path)?;
        let file = tokio::fs::File::open(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BucketError::NotFound(path.to_string())
            } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                BucketError::AccessDenied(format!("{}: {}", path, e))
            } else {
                BucketError::Io(format!("{}: {}", path, e))
            }
        })?;

        if file.metadata().await?.is_dir() {
            return Err(BucketError::NotFound(path.to_string()));
        }

        Ok(Box::new(FileReader { file }))
    }
}

/// Reader over an open file; the handle closes on drop.
struct FileReader {
    file: tokio::fs::File,
}

#[async_trait]
impl ObjectReader for FileReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BucketError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}
