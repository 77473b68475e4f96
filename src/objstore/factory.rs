//! objstore::factory
//!
//! Bucket provider selection and creation.
//!
//! # Design
//!
//! Commands use `create_bucket()` instead of constructing backends directly,
//! so the inspection pipeline only ever sees `Box<dyn Bucket>`.
//!
//! # Providers
//!
//! - `gcs` → `GcsBucket`, the bucket name is a GCS bucket
//! - `filesystem` → `FilesystemBucket`, the bucket name is a local directory
//!
//! # Example
//!
//! ```ignore
//! use blockscope::objstore::{create_bucket, BucketConfig, BucketProvider};
//!
//! let bucket = create_bucket(&BucketConfig {
//!     provider: BucketProvider::Gcs,
//!     bucket: "my-blocks".into(),
//!     gcs_endpoint: None,
//!     gcs_token: Some(token),
//! })?;
//! ```

use super::filesystem::FilesystemBucket;
use super::gcs::GcsBucket;
use super::traits::{Bucket, BucketError};

/// Supported bucket providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketProvider {
    /// Google Cloud Storage
    Gcs,
    /// Local directory
    Filesystem,
}

impl BucketProvider {
    /// Get all available providers.
    ///
    /// # Example
    ///
    /// ```
    /// use blockscope::objstore::BucketProvider;
    ///
    /// assert!(BucketProvider::all().contains(&BucketProvider::Gcs));
    /// ```
    pub fn all() -> &'static [BucketProvider] {
        &[BucketProvider::Gcs, BucketProvider::Filesystem]
    }

    /// Get the provider name as used in configuration and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            BucketProvider::Gcs => "gcs",
            BucketProvider::Filesystem => "filesystem",
        }
    }

    /// Parse a provider from a string, ignoring case.
    ///
    /// # Example
    ///
    /// ```
    /// use blockscope::objstore::BucketProvider;
    ///
    /// assert_eq!(BucketProvider::parse("GCS"), Some(BucketProvider::Gcs));
    /// assert_eq!(BucketProvider::parse("s3"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gcs" => Some(BucketProvider::Gcs),
            "filesystem" => Some(BucketProvider::Filesystem),
            _ => None,
        }
    }

    /// Resolve a provider name, with an error listing the valid names.
    pub fn resolve(name: &str) -> Result<Self, BucketError> {
        Self::parse(name).ok_or_else(|| {
            BucketError::InvalidConfig(format!(
                "unknown bucket provider '{}'. Available providers: {}",
                name,
                valid_provider_names().join(", ")
            ))
        })
    }
}

impl std::fmt::Display for BucketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything needed to open a bucket.
#[derive(Clone)]
pub struct BucketConfig {
    /// Backend to use
    pub provider: BucketProvider,
    /// Bucket name (a directory path for the filesystem provider)
    pub bucket: String,
    /// GCS API endpoint override
    pub gcs_endpoint: Option<String>,
    /// GCS bearer token
    pub gcs_token: Option<String>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for BucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketConfig")
            .field("provider", &self.provider)
            .field("bucket", &self.bucket)
            .field("gcs_endpoint", &self.gcs_endpoint)
            .field("has_gcs_token", &self.gcs_token.is_some())
            .finish()
    }
}

/// Create a bucket handle for the configured provider.
///
/// # Errors
///
/// `BucketError::InvalidConfig` if the bucket name is empty, the endpoint is
/// unusable, or a filesystem root is not a directory.
pub fn create_bucket(config: &BucketConfig) -> Result<Box<dyn Bucket>, BucketError> {
    if config.bucket.trim().is_empty() {
        return Err(BucketError::InvalidConfig(
            "bucket name must not be empty".into(),
        ));
    }

    tracing::debug!(provider = %config.provider, bucket = %config.bucket, "creating bucket");

    match config.provider {
        BucketProvider::Gcs => {
            let mut bucket = GcsBucket::new(&config.bucket)?;
            if let Some(endpoint) = &config.gcs_endpoint {
                bucket = bucket.with_endpoint(endpoint);
            }
            if let Some(token) = &config.gcs_token {
                bucket = bucket.with_token(token);
            }
            Ok(Box::new(bucket))
        }
        BucketProvider::Filesystem => Ok(Box::new(FilesystemBucket::new(&config.bucket)?)),
    }
}

/// Get list of valid provider names for configuration validation.
pub fn valid_provider_names() -> &'static [&'static str] {
    &["gcs", "filesystem"]
}

#[cfg(test)]
mod tests {
    use super::*;

    mod bucket_provider {
        use super::*;

        #[test]
        fn all_includes_both() {
            let all = BucketProvider::all();
            assert!(all.contains(&BucketProvider::Gcs));
            assert!(all.contains(&BucketProvider::Filesystem));
        }

        #[test]
        fn parse_ignores_case() {
            assert_eq!(BucketProvider::parse("gcs"), Some(BucketProvider::Gcs));
            assert_eq!(BucketProvider::parse("Gcs"), Some(BucketProvider::Gcs));
            assert_eq!(
                BucketProvider::parse("FILESYSTEM"),
                Some(BucketProvider::Filesystem)
            );
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(BucketProvider::parse("s3"), None);
            assert_eq!(BucketProvider::parse(""), None);
        }

        #[test]
        fn resolve_lists_available() {
            let err = BucketProvider::resolve("azure").unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("azure"));
            assert!(msg.contains("gcs, filesystem"));
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", BucketProvider::Gcs), "gcs");
            assert_eq!(format!("{}", BucketProvider::Filesystem), "filesystem");
        }

        #[test]
        fn names_match_valid_names() {
            for provider in BucketProvider::all() {
                assert!(valid_provider_names().contains(&provider.name()));
            }
        }
    }

    mod create_bucket {
        use super::*;

        fn config(provider: BucketProvider, bucket: &str) -> BucketConfig {
            BucketConfig {
                provider,
                bucket: bucket.to_string(),
                gcs_endpoint: None,
                gcs_token: None,
            }
        }

        #[test]
        fn gcs() {
            let bucket = create_bucket(&config(BucketProvider::Gcs, "blocks")).unwrap();
            assert_eq!(bucket.name(), "blocks");
        }

        #[test]
        fn filesystem() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().to_string_lossy().to_string();
            let bucket = create_bucket(&config(BucketProvider::Filesystem, &path)).unwrap();
            assert_eq!(bucket.name(), path);
        }

        #[test]
        fn filesystem_missing_root() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("absent").to_string_lossy().to_string();
            let result = create_bucket(&config(BucketProvider::Filesystem, &path));
            assert!(matches!(result, Err(BucketError::InvalidConfig(_))));
        }

        #[test]
        fn empty_name_rejected() {
            let result = create_bucket(&config(BucketProvider::Gcs, ""));
            assert!(matches!(result, Err(BucketError::InvalidConfig(_))));
        }

        #[test]
        fn debug_hides_token() {
            let mut cfg = config(BucketProvider::Gcs, "blocks");
            cfg.gcs_token = Some("secret-token".into());
            let debug = format!("{:?}", cfg);
            assert!(!debug.contains("secret-token"));
        }
    }
}
