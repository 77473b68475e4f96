//! inspect::error
//!
//! Error taxonomy for block inspection.
//!
//! Every error is fatal to a walk and the first one wins. `Entry` adds the
//! name of the entry being processed when a failure surfaces from the walker;
//! use [`InspectError::kind`] to classify an error regardless of wrapping.

use std::time::Duration;

use thiserror::Error;

use crate::objstore::BucketError;

/// Errors from listing and inspecting blocks.
#[derive(Debug, Error)]
pub enum InspectError {
    /// Invalid output format, configuration, or bucket construction.
    #[error("setup failed: {0}")]
    SetupFailed(String),

    /// Listing failed or produced an entry that is not a block directory.
    #[error("enumeration of '{prefix}' failed: {reason}")]
    EnumerationFailed { prefix: String, reason: String },

    /// The metadata object could not be opened or read.
    #[error("get reader for {path}")]
    FetchFailed {
        path: String,
        #[source]
        source: BucketError,
    },

    /// The metadata document is malformed or inconsistent.
    #[error("decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    /// Output could not be produced or written.
    #[error("render {entry}: {reason}")]
    RenderFailed { entry: String, reason: String },

    /// The walk ran past its deadline.
    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },

    /// A failure while processing one enumerated entry.
    #[error("iterate bucket: entry {entry}")]
    Entry {
        entry: String,
        #[source]
        source: Box<InspectError>,
    },
}

/// Classification of an [`InspectError`], independent of context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Enumeration,
    Fetch,
    Decode,
    Render,
    Deadline,
}

impl InspectError {
    /// Wrap an error with the entry it occurred on.
    pub fn entry(entry: impl Into<String>, source: InspectError) -> Self {
        InspectError::Entry {
            entry: entry.into(),
            source: Box::new(source),
        }
    }

    /// Classify the error, looking through `Entry` wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InspectError::SetupFailed(_) => ErrorKind::Setup,
            InspectError::EnumerationFailed { .. } => ErrorKind::Enumeration,
            InspectError::FetchFailed { .. } => ErrorKind::Fetch,
            InspectError::DecodeFailed { .. } => ErrorKind::Decode,
            InspectError::RenderFailed { .. } => ErrorKind::Render,
            InspectError::DeadlineExceeded { .. } => ErrorKind::Deadline,
            InspectError::Entry { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with all `Entry` wrappers removed.
    pub fn innermost(&self) -> &InspectError {
        match self {
            InspectError::Entry { source, .. } => source.innermost(),
            other => other,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Setup => "setup",
            ErrorKind::Enumeration => "enumeration",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Decode => "decode",
            ErrorKind::Render => "render",
            ErrorKind::Deadline => "deadline",
        };
        write!(f, "{}", name)
    }
}
