//! objstore::gcs
//!
//! Google Cloud Storage bucket using the JSON API.
//!
//! # Design
//!
//! This module implements the `Bucket` trait for GCS over plain HTTPS:
//! - Listing uses `objects.list` with `delimiter=/`, one page per call
//! - Reads use `objects.get` with `alt=media`, streamed chunk by chunk
//!
//! # Authentication
//!
//! An optional OAuth2 bearer token is sent with every request. Without a
//! token requests are anonymous, which works for public buckets and local
//! emulators. Obtaining and refreshing tokens is the caller's concern.
//!
//! # Retries
//!
//! None. Failures are mapped to `BucketError` and returned.
//!
//! # Example
//!
//! ```ignore
//! use blockscope::objstore::gcs::GcsBucket;
//! use blockscope::objstore::Bucket;
//!
//! let bucket = GcsBucket::new("my-blocks")?.with_token(token);
//! let page = bucket.list_page("", None).await?;
//! for entry in page.entries {
//!     println!("{}", entry);
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use super::traits::{Bucket, BucketError, ListPage, ObjectReader};

/// Default GCS API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "blockscope";

/// GCS bucket implementation.
pub struct GcsBucket {
    /// HTTP client for making requests
    client: Client,
    /// Bucket name
    bucket: String,
    /// API endpoint (configurable for emulators)
    endpoint: String,
    /// OAuth2 bearer token
    token: Option<String>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GcsBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBucket")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl GcsBucket {
    /// Create a GCS bucket handle using the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns `BucketError::InvalidConfig` if the bucket name is empty or
    /// the HTTP client cannot be built.
    pub fn new(bucket: impl Into<String>) -> Result<Self, BucketError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(BucketError::InvalidConfig(
                "bucket name must not be empty".into(),
            ));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| BucketError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bucket,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
        })
    }

    /// Use a custom API endpoint (e.g. an emulator).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Authenticate requests with an OAuth2 bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the API endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if requests carry a bearer token.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, BucketError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| BucketError::InvalidConfig("token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Build the URL of the bucket's object collection, plus extra path segments.
    fn objects_url(&self, extra: Option<&str>) -> Result<Url, BucketError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            BucketError::InvalidConfig(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BucketError::InvalidConfig(format!("endpoint '{}' cannot be a base", self.endpoint))
            })?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            // Object names are a single segment; '/' is percent-encoded.
            if let Some(name) = extra {
                segments.push(name);
            }
        }
        Ok(url)
    }

    /// Map an error response to a `BucketError`.
    async fn handle_error_response(response: Response, path: &str) -> BucketError {
        let status = response.status();
        let message = match response.json::<GcsErrorResponse>().await {
            Ok(err) => err.error.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                BucketError::AccessDenied(format!("{}: {}", path, message))
            }
            StatusCode::NOT_FOUND => BucketError::NotFound(path.to_string()),
            _ if status.is_server_error() => BucketError::ApiError {
                status: status.as_u16(),
                message: format!("GCS server error: {}", message),
            },
            _ => BucketError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl Bucket for GcsBucket {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn list_page(
        &self,
        dir: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BucketError> {
        let mut url = self.objects_url(None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("delimiter", "/");
            if !dir.is_empty() {
                query.append_pair("prefix", dir);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        tracing::debug!(bucket = %self.bucket, dir, "listing GCS objects");

        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| BucketError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let target = format!("gs://{}/{}", self.bucket, dir);
            return Err(Self::handle_error_response(response, &target).await);
        }

        let status = response.status();
        let body: GcsListResponse = response.json().await.map_err(|e| BucketError::ApiError {
            status: status.as_u16(),
            message: format!("Failed to parse list response: {}", e),
        })?;

        let mut entries: Vec<String> = body
            .prefixes
            .into_iter()
            .chain(
                body.items
                    .into_iter()
                    .map(|item| item.name)
                    // The directory placeholder object is not a child.
                    .filter(|name| name != dir),
            )
            .collect();
        entries.sort();

        Ok(ListPage {
            entries,
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get(&self, path: &str) -> Result<Box<dyn ObjectReader>, BucketError> {
        let mut url = self.objects_url(Some(path))?;
        url.query_pairs_mut().append_pair("alt", "media");

        tracing::debug!(bucket = %self.bucket, path, "reading GCS object");

        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| BucketError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error_response(response, path).await);
        }

        Ok(Box::new(GcsReader { response }))
    }
}

/// Streaming reader over an object download; the connection is released on drop.
struct GcsReader {
    response: Response,
}

#[async_trait]
impl ObjectReader for GcsReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BucketError> {
        self.response
            .chunk()
            .await
            .map_err(|e| BucketError::NetworkError(e.to_string()))
    }
}

// =============================================================================
// GCS API types (internal)
// =============================================================================

/// Response body of `objects.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

/// Object resource (only the fields we use).
#[derive(Debug, Deserialize)]
struct GcsObject {
    name: String,
}

/// Error response envelope.
#[derive(Debug, Deserialize)]
struct GcsErrorResponse {
    error: GcsErrorBody,
}

#[derive(Debug, Deserialize)]
struct GcsErrorBody {
    message: String,
}
