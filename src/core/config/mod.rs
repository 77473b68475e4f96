//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment / CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$BLOCKSCOPE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/blockscope/config.toml`
//! 3. `~/.blockscope/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use blockscope::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("Provider: {}", config.provider());
//! println!("Timeout: {:?}", config.timeout());
//! ```

pub mod schema;

pub use schema::{FileConfig, GcsConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BLOCKSCOPE_CONFIG";

/// Default time budget for one bucket walk.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default bucket provider.
pub const DEFAULT_PROVIDER: &str = "gcs";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration with defaults applied by accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults if no file was found)
    pub file: FileConfig,
    /// Path of the file that was loaded, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated. A missing config file is not an error.
    pub fn load() -> Result<Config, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Config {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Locate the first existing config file.
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("blockscope/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".blockscope/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Path of the loaded config file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Get the bucket provider.
    ///
    /// Defaults to "gcs" if not configured.
    pub fn provider(&self) -> &str {
        self.file.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Get the walk timeout.
    ///
    /// Defaults to five minutes if not configured.
    pub fn timeout(&self) -> Duration {
        self.file
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Get the GCS endpoint override, if any.
    pub fn gcs_endpoint(&self) -> Option<&str> {
        self.file.gcs.as_ref().and_then(|g| g.endpoint.as_deref())
    }

    /// Get the configured GCS token, if any.
    pub fn gcs_token(&self) -> Option<&str> {
        self.file.gcs.as_ref().and_then(|g| g.token.as_deref())
    }
}
