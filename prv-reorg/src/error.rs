//! Error types for prv-reorg

use std::path::PathBuf;
use thiserror::Error;

/// Source file name does not follow the PRV naming convention
///
/// Recoverable: the file is skipped with a warning and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not parse filename: {filename} ({reason})")]
pub struct ParseError {
    pub filename: String,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(filename: &str, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reorganizer error type
#[derive(Debug, Error)]
pub enum ReorgError {
    /// Allow-list missing, unreadable or malformed (fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input directory does not exist or is not a directory (fatal)
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),

    /// Copy or directory creation failed for one destination
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two sources map onto the same canonical destination in one run
    #[error("Destination {destination} already written from {first_source} in this run")]
    DestinationConflict {
        destination: PathBuf,
        first_source: PathBuf,
    },

    /// Directory walk error
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Shared configuration or logging error
    #[error("Common error: {0}")]
    Common(#[from] prv_common::Error),
}

impl ReorgError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReorgError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for reorganizer operations
pub type Result<T> = std::result::Result<T, ReorgError>;
