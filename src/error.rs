//! Error types for the vector index engine
//!
//! This module provides structured error types using thiserror. Every public
//! operation returns either a well-formed result or one of these errors, which
//! carry the operation, the offending input and the underlying cause.

use crate::extract::ExtractError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for index operations
#[derive(Error, Debug)]
pub enum VecdexError {
    /// A vector's length disagrees with the index dimensionality
    #[error(
        "Vector dimension mismatch during {operation}: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same feature extractor"
    )]
    DimensionMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot insert {vectors} vectors with {records} metadata records: counts must match")]
    RecordCountMismatch { vectors: usize, records: usize },

    #[error(
        "Approximate index is not trained, cannot {operation}\nSuggestion: Train the index on a representative batch before adding vectors"
    )]
    NotTrained { operation: &'static str },

    #[error(
        "Insufficient training data: {samples} samples for {regions} regions\nSuggestion: Provide at least as many training vectors as regions, or use fewer regions"
    )]
    InsufficientTrainingData { samples: usize, regions: usize },

    /// A persisted artifact is missing
    #[error("Index artifact not found at '{path}'. Build the index first.")]
    IndexNotFound { path: PathBuf },

    #[error("Feature extraction failed for {item}: {source}")]
    FeatureExtraction { item: String, source: ExtractError },

    #[error("Metadata side-table is corrupted: {reason}")]
    CorruptMetadata { reason: String },

    #[error("Index blob is corrupted: {reason}")]
    CorruptIndex { reason: String },

    #[error("Invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to create ordinal: maximum vector count reached")]
    OrdinalExhausted,

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize or deserialize '{path}': {reason}")]
    Serialization { path: PathBuf, reason: String },

    #[error(
        "Unsupported index format version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}

impl VecdexError {
    /// Get a stable status code for this error type.
    ///
    /// Used as the error kind in structured results handed to collaborators.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::RecordCountMismatch { .. } => "RECORD_COUNT_MISMATCH",
            Self::NotTrained { .. } => "NOT_TRAINED",
            Self::InsufficientTrainingData { .. } => "INSUFFICIENT_TRAINING_DATA",
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::FeatureExtraction { .. } => "FEATURE_EXTRACTION_ERROR",
            Self::CorruptMetadata { .. } => "CORRUPT_METADATA",
            Self::CorruptIndex { .. } => "CORRUPT_INDEX",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::InvalidConfig { .. } => "CONFIG_ERROR",
            Self::OrdinalExhausted => "ORDINAL_EXHAUSTED",
            Self::Io { .. } => "IO_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::IndexNotFound { .. } => vec![
                "Run 'vecdex build <source>' to create the index",
                "Check storage.index_path and storage.metadata_path in settings.toml",
            ],
            Self::CorruptMetadata { .. } | Self::CorruptIndex { .. } => vec![
                "The index and metadata files must be written and loaded as a pair",
                "Run 'vecdex build <source>' to rebuild both artifacts",
            ],
            Self::VersionMismatch { .. } => {
                vec!["Rebuild the index with the current vecdex version"]
            }
            Self::NotTrained { .. } | Self::InsufficientTrainingData { .. } => vec![
                "Build with a larger first batch, or lower index.regions",
                "Small corpora below index.exact_threshold use the exact index and need no training",
            ],
            Self::DimensionMismatch { .. } => vec![
                "Use the same feature extractor for building, adding and querying",
            ],
            Self::FeatureExtraction { .. } => vec![
                "Check that the item is reachable and readable",
                "Raise ingest.item_timeout_secs for slow sources",
            ],
            Self::Io { .. } => vec!["Check disk space and file permissions"],
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type VecdexResult<T> = Result<T, VecdexError>;

/// Helper trait for attaching a path to I/O failures
pub trait IoContext<T> {
    /// Wrap an I/O error with the path it occurred on
    fn with_path(self, path: &Path) -> VecdexResult<T>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &Path) -> VecdexResult<T> {
        self.map_err(|source| VecdexError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
