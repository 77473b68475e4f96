//! core::meta
//!
//! Block metadata document (`meta.json`).
//!
//! # Schema Design
//!
//! Every block directory in a bucket carries a `meta.json` object describing
//! the block: its identifier, the time range it covers, sample statistics,
//! compaction lineage, and the external labels attached to it.
//!
//! - Known fields are strictly typed.
//! - Unknown keys are preserved verbatim, so decode then encode is lossless.
//! - Encoding uses a fixed key order and tab indentation.
//!
//! # Example
//!
//! ```
//! use blockscope::core::meta::{parse_meta, BlockMeta};
//!
//! let json = br#"{
//!     "ulid": "01ABC",
//!     "minTime": 0,
//!     "maxTime": 100,
//!     "stats": { "numSamples": 10 },
//!     "compaction": { "level": 1, "sources": [] },
//!     "version": 1,
//!     "labels": {}
//! }"#;
//!
//! let meta = parse_meta(json).unwrap();
//! assert_eq!(meta.ulid, "01ABC");
//! assert_eq!(meta.stats.num_samples, 10);
//!
//! // Canonical encoding parses back to the same document
//! let encoded = meta.to_canonical_json().unwrap();
//! assert_eq!(parse_meta(encoded.as_bytes()).unwrap(), meta);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use thiserror::Error;

/// Name of the metadata object inside every block directory.
pub const META_FILENAME: &str = "meta.json";

/// Metadata format version understood by this crate.
pub const META_VERSION: u32 = 1;

/// Errors from metadata operations.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("failed to parse metadata: {0}")]
    ParseError(String),

    #[error("unsupported metadata version {0}, supported: {META_VERSION}")]
    UnsupportedVersion(u32),

    #[error("invalid metadata value: {0}")]
    InvalidValue(String),

    #[error("failed to encode metadata: {0}")]
    EncodeError(String),
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct MetaEnvelope {
    version: u32,
}

/// Parse a `meta.json` document with version dispatch and validation.
///
/// # Errors
///
/// Returns an error if:
/// - The bytes are not a well-formed JSON object
/// - The `version` field is missing or unsupported
/// - A required field is missing or has the wrong type
/// - The document fails [`BlockMeta::validate`]
pub fn parse_meta(bytes: &[u8]) -> Result<BlockMeta, MetaError> {
    let envelope: MetaEnvelope =
        serde_json::from_slice(bytes).map_err(|e| MetaError::ParseError(e.to_string()))?;

    match envelope.version {
        META_VERSION => {
            let meta: BlockMeta =
                serde_json::from_slice(bytes).map_err(|e| MetaError::ParseError(e.to_string()))?;
            meta.validate()?;
            Ok(meta)
        }
        v => Err(MetaError::UnsupportedVersion(v)),
    }
}

/// Block metadata (v1).
///
/// Read-only once decoded. Use [`parse_meta`] to decode with validation and
/// [`BlockMeta::to_canonical_json`] to re-encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    /// Block identifier; matches the block's directory name
    pub ulid: String,

    /// Earliest sample timestamp in the block (milliseconds)
    pub min_time: i64,

    /// Latest sample timestamp in the block (milliseconds)
    pub max_time: i64,

    /// Sample statistics
    #[serde(default)]
    pub stats: BlockStats,

    /// Compaction lineage
    #[serde(default)]
    pub compaction: BlockCompaction,

    /// Metadata format version
    pub version: u32,

    /// External labels attached to the block
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Top-level keys not modeled above, kept for lossless re-encoding
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BlockMeta {
    /// Create metadata for a fresh (level 1) block with no statistics.
    pub fn new(ulid: impl Into<String>, min_time: i64, max_time: i64) -> Self {
        let ulid = ulid.into();
        Self {
            compaction: BlockCompaction {
                level: 1,
                sources: vec![ulid.clone()],
                extra: BTreeMap::new(),
            },
            ulid,
            min_time,
            max_time,
            stats: BlockStats::default(),
            version: META_VERSION,
            labels: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Validate field values that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns `MetaError::InvalidValue` if the identifier is empty or the
    /// time range is inverted, and `MetaError::UnsupportedVersion` for an
    /// unknown version.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.version != META_VERSION {
            return Err(MetaError::UnsupportedVersion(self.version));
        }
        if self.ulid.is_empty() {
            return Err(MetaError::InvalidValue("ulid must not be empty".into()));
        }
        if self.min_time > self.max_time {
            return Err(MetaError::InvalidValue(format!(
                "minTime {} is after maxTime {}",
                self.min_time, self.max_time
            )));
        }
        Ok(())
    }

    /// Encode as tab-indented JSON with a fixed key order and trailing newline.
    pub fn to_canonical_json(&self) -> Result<String, MetaError> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)
            .map_err(|e| MetaError::EncodeError(e.to_string()))?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| MetaError::EncodeError(e.to_string()))
    }
}

/// Sample statistics. Zero counts are omitted when encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    #[serde(default, alias = "samples", skip_serializing_if = "is_zero")]
    pub num_samples: u64,

    #[serde(default, alias = "series", skip_serializing_if = "is_zero")]
    pub num_series: u64,

    #[serde(default, alias = "chunks", skip_serializing_if = "is_zero")]
    pub num_chunks: u64,

    #[serde(default, alias = "tombstones", skip_serializing_if = "is_zero")]
    pub num_tombstones: u64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Compaction lineage of a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockCompaction {
    /// Compaction level (1 = freshly written)
    #[serde(default)]
    pub level: u32,

    /// Identifiers of the blocks this block was compacted from, in order
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}
