//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing to ensure they conform to
//! expected formats (e.g., the provider must be a known bucket provider).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// User configuration.
///
/// # Example
///
/// ```toml
/// provider = "gcs"
/// timeout_secs = 300
///
/// [gcs]
/// endpoint = "https://storage.googleapis.com"
/// token = "ya29...."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Default bucket provider (e.g., "gcs", "filesystem")
    pub provider: Option<String>,

    /// Time budget for a whole bucket walk, in seconds
    pub timeout_secs: Option<u64>,

    /// Google Cloud Storage settings
    pub gcs: Option<GcsConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            let valid = crate::objstore::valid_provider_names();
            if !valid.contains(&provider.to_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid provider '{}', must be one of: {}",
                    provider,
                    valid.join(", ")
                )));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be greater than zero".into(),
            ));
        }

        if let Some(gcs) = &self.gcs {
            gcs.validate()?;
        }

        Ok(())
    }
}

/// Google Cloud Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GcsConfig {
    /// API endpoint (override for emulators)
    pub endpoint: Option<String>,

    /// OAuth2 bearer token
    pub token: Option<String>,
}

impl GcsConfig {
    /// Validate GCS settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "gcs endpoint '{}' must start with http:// or https://",
                    endpoint
                )));
            }
        }
        if let Some(token) = &self.token {
            if token.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "gcs token must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
