//! cli::commands::bucket_ls
//!
//! List the blocks in a bucket.
//!
//! # Design
//!
//! Setup happens in a fixed order so that cheap local failures are reported
//! before any network access:
//!
//! 1. Parse the output format (a bad template fails here)
//! 2. Load configuration and merge it with the flags
//! 3. Build the bucket
//! 4. Walk the bucket under one deadline, streaming records to stdout
//!
//! # Example
//!
//! ```bash
//! blockscope bucket --bucket my-blocks ls -o json
//! ```

use std::io::BufWriter;
use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::cli::args::BucketArgs;
use crate::core::config::Config;
use crate::inspect::{list_blocks, Deadline, InspectError, OutputFormat};
use crate::objstore::{create_bucket, BucketConfig, BucketProvider};

/// Settings for one `bucket ls` run, after merging flags and configuration.
#[derive(Debug)]
pub struct LsPlan {
    pub bucket: BucketConfig,
    pub format: OutputFormat,
    pub prefix: String,
    pub timeout: Duration,
}

impl LsPlan {
    /// Merge flags over configuration. Flags (and `GCS_OAUTH_TOKEN`) win.
    pub fn resolve(
        args: &BucketArgs,
        format: OutputFormat,
        prefix: &str,
        config: &Config,
    ) -> Result<Self, InspectError> {
        let provider_name = args.provider.as_deref().unwrap_or(config.provider());
        let provider = BucketProvider::resolve(provider_name)
            .map_err(|e| InspectError::SetupFailed(e.to_string()))?;

        let timeout = args
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.timeout());

        Ok(Self {
            bucket: BucketConfig {
                provider,
                bucket: args.bucket.clone(),
                gcs_endpoint: args
                    .gcs_endpoint
                    .clone()
                    .or_else(|| config.gcs_endpoint().map(str::to_string)),
                gcs_token: args
                    .gcs_token
                    .clone()
                    .or_else(|| config.gcs_token().map(str::to_string)),
            },
            format,
            prefix: prefix.to_string(),
            timeout,
        })
    }
}

/// Run `bucket ls`.
pub fn bucket_ls(args: &BucketArgs, output: &str, prefix: &str) -> Result<()> {
    // The format is checked before configuration or the bucket are touched.
    let format = OutputFormat::parse(output)?;

    let config = Config::load().map_err(|e| InspectError::SetupFailed(e.to_string()))?;
    if let Some(path) = config.path() {
        tracing::debug!(path = %path.display(), "loaded configuration");
    }

    let plan = LsPlan::resolve(args, format, prefix, &config)?;

    let bucket = create_bucket(&plan.bucket).map_err(|e| {
        InspectError::SetupFailed(format!("create {} bucket: {}", plan.bucket.provider, e))
    })?;

    tracing::debug!(
        bucket = bucket.name(),
        provider = %plan.bucket.provider,
        prefix = %plan.prefix,
        timeout_secs = plan.timeout.as_secs(),
        "listing blocks"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let deadline = Deadline::after(plan.timeout);
        let out = BufWriter::new(std::io::stdout());
        list_blocks(bucket.as_ref(), &plan.prefix, plan.format, &deadline, out).await
    })
    .with_context(|| format!("list blocks in bucket {}", args.bucket))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::BucketCommand;
    use crate::core::config::schema::{FileConfig, GcsConfig};

    fn args() -> BucketArgs {
        BucketArgs {
            bucket: "blocks".into(),
            provider: None,
            gcs_endpoint: None,
            gcs_token: None,
            timeout: None,
            command: BucketCommand::Ls {
                output: String::new(),
                prefix: String::new(),
            },
        }
    }

    fn config_with(file: FileConfig) -> Config {
        let mut config = Config::default();
        config.file = file;
        config
    }

    #[test]
    fn defaults() {
        let plan = LsPlan::resolve(&args(), OutputFormat::NameOnly, "", &Config::default()).unwrap();
        assert_eq!(plan.bucket.provider, BucketProvider::Gcs);
        assert_eq!(plan.format, OutputFormat::NameOnly);
        assert_eq!(plan.timeout, Duration::from_secs(300));
        assert!(plan.bucket.gcs_token.is_none());
    }

    #[test]
    fn config_supplies_defaults() {
        let config = config_with(FileConfig {
            provider: Some("filesystem".into()),
            timeout_secs: Some(30),
            gcs: Some(GcsConfig {
                endpoint: Some("http://localhost:4443".into()),
                token: Some("from-config".into()),
            }),
        });

        let plan = LsPlan::resolve(&args(), OutputFormat::CanonicalJson, "", &config).unwrap();
        assert_eq!(plan.bucket.provider, BucketProvider::Filesystem);
        assert_eq!(plan.timeout, Duration::from_secs(30));
        assert_eq!(plan.bucket.gcs_endpoint.as_deref(), Some("http://localhost:4443"));
        assert_eq!(plan.bucket.gcs_token.as_deref(), Some("from-config"));
    }

    #[test]
    fn flags_override_config() {
        let config = config_with(FileConfig {
            provider: Some("filesystem".into()),
            timeout_secs: Some(30),
            gcs: Some(GcsConfig {
                endpoint: None,
                token: Some("from-config".into()),
            }),
        });
        let mut args = args();
        args.provider = Some("gcs".into());
        args.timeout = Some(5);
        args.gcs_token = Some("from-flag".into());

        let plan = LsPlan::resolve(&args, OutputFormat::NameOnly, "", &config).unwrap();
        assert_eq!(plan.bucket.provider, BucketProvider::Gcs);
        assert_eq!(plan.timeout, Duration::from_secs(5));
        assert_eq!(plan.bucket.gcs_token.as_deref(), Some("from-flag"));
    }

    #[test]
    fn unknown_provider_is_setup_error() {
        let mut args = args();
        args.provider = Some("s3".into());
        let err = LsPlan::resolve(&args, OutputFormat::NameOnly, "", &Config::default()).unwrap_err();
        assert!(matches!(err, InspectError::SetupFailed(_)));
    }

    #[test]
    fn bad_template_fails_before_bucket() {
        let mut args = args();
        // A bucket that could never be opened; the template error must win.
        args.provider = Some("filesystem".into());
        args.bucket = "/nonexistent/blockscope/bucket".into();
        let err = bucket_ls(&args, "{{.ULID", "").unwrap_err();
        let inspect = err.downcast_ref::<InspectError>().expect("inspect error");
        assert!(matches!(inspect, InspectError::SetupFailed(m) if m.contains("invalid template")));
    }
}
