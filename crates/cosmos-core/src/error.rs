//! Error types for the COSMOS extraction pipeline
//!
//! Hard errors are returned as [`CosmosError`]. Failures that are scoped to a
//! single page or region are never returned as errors from the document-level
//! API; they are recorded on the output instead ([`PageFailure`] on a page,
//! [`RecordFlag`] on a content record) so that one bad page or region never
//! aborts the document.
//!
//! # Examples
//!
//! ```
//! use cosmos_core::{CosmosError, PageFailure};
//!
//! let err = CosmosError::DetectionUnavailable {
//!     detector: "replay".to_string(),
//!     reason: "no detections for page 2".to_string(),
//! };
//! let failure = PageFailure::from(&err);
//! assert!(matches!(failure, PageFailure::DetectionUnavailable { .. }));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while extracting a document
#[derive(Error, Debug)]
pub enum CosmosError {
    /// The detection capability could not be reached
    ///
    /// The page being processed is marked failed and skipped; the rest of the
    /// document continues.
    #[error("Detection unavailable ({detector}): {reason}")]
    DetectionUnavailable {
        /// Name of the detector that failed
        detector: String,
        /// What the capability reported
        reason: String,
    },

    /// A page image could not be read or decoded
    #[error("Malformed input for page {page_number}: {reason}")]
    MalformedInput {
        /// 1-based page number
        page_number: u32,
        /// Description of the decoding problem
        reason: String,
    },

    /// The document deadline elapsed before every page finished
    #[error("Aggregation incomplete: {completed} of {expected} pages finished before the deadline")]
    AggregationIncomplete { completed: usize, expected: usize },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    ConfigError {
        /// Description of what is invalid in the configuration
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl CosmosError {
    /// Shorthand for a [`CosmosError::ConfigError`]
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }
}

/// Type alias for [`Result<T, CosmosError>`].
pub type Result<T> = std::result::Result<T, CosmosError>;

/// Why a page is missing from a document record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageFailure {
    /// The detector could not be reached for this page
    DetectionUnavailable { reason: String },
    /// The page image was unreadable
    MalformedInput { reason: String },
    /// The document deadline elapsed before the page finished
    TimedOut,
    /// The page worker stopped without producing a result
    WorkerLost { reason: String },
}

impl From<&CosmosError> for PageFailure {
    fn from(err: &CosmosError) -> Self {
        match err {
            CosmosError::DetectionUnavailable { reason, .. } => Self::DetectionUnavailable {
                reason: reason.clone(),
            },
            CosmosError::MalformedInput { reason, .. } => Self::MalformedInput {
                reason: reason.clone(),
            },
            CosmosError::ImageError(e) => Self::MalformedInput {
                reason: e.to_string(),
            },
            CosmosError::AggregationIncomplete { .. } => Self::TimedOut,
            other => Self::WorkerLost {
                reason: other.to_string(),
            },
        }
    }
}

/// Non-fatal conditions recorded on a content record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFlag {
    /// Text recognition failed; the record keeps an empty text payload
    ExtractionDegraded { reason: String },
}
