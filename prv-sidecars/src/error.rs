//! Error types for sidecar generation

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Output encoding of a sidecar file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Tsv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("JSON"),
            OutputFormat::Tsv => f.write_str("TSV"),
        }
    }
}

/// One problem found while validating a sidecar
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// Table payload has no rows
    EmptyTable,

    /// REQUIRED fields absent; `row` is set for table payloads
    MissingRequired {
        row: Option<usize>,
        fields: Vec<String>,
    },

    /// Row columns differ from the first row's columns
    InconsistentColumns {
        row: usize,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Field present but with a disallowed type or value
    Schema { field: String, message: String },
}

impl ValidationIssue {
    /// True if this issue names `field`
    pub fn mentions(&self, field: &str) -> bool {
        match self {
            ValidationIssue::EmptyTable => false,
            ValidationIssue::MissingRequired { fields, .. } => fields.iter().any(|f| f == field),
            ValidationIssue::InconsistentColumns { missing, extra, .. } => {
                missing.iter().chain(extra).any(|f| f == field)
            }
            ValidationIssue::Schema { field: name, .. } => name == field,
        }
    }

    pub(crate) fn not_an_object() -> Self {
        ValidationIssue::Schema {
            field: "payload".to_string(),
            message: "expected an object".to_string(),
        }
    }

    pub(crate) fn not_a_table() -> Self {
        ValidationIssue::Schema {
            field: "payload".to_string(),
            message: "expected a table".to_string(),
        }
    }

    /// Table row this issue refers to, if any
    pub fn row(&self) -> Option<usize> {
        match self {
            ValidationIssue::MissingRequired { row, .. } => *row,
            ValidationIssue::InconsistentColumns { row, .. } => Some(*row),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTable => f.write_str("table has no rows"),
            ValidationIssue::MissingRequired { row: None, fields } => {
                write!(f, "missing REQUIRED fields: {:?}", fields)
            }
            ValidationIssue::MissingRequired {
                row: Some(row),
                fields,
            } => write!(f, "row {} missing REQUIRED fields: {:?}", row, fields),
            ValidationIssue::InconsistentColumns {
                row,
                missing,
                extra,
            } => write!(
                f,
                "row {} has inconsistent columns (missing {:?}, extra {:?})",
                row, missing, extra
            ),
            ValidationIssue::Schema { field, message } => write!(f, "{}: {}", field, message),
        }
    }
}

/// Validation failure listing every issue found
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub sidecar: &'static str,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// True if any issue names `field`
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.mentions(field))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failed", self.sidecar)?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Sidecar construction, validation and persistence errors
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Directory creation or file write failed
    #[error("Failed to write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Format not available for this payload shape (TSV of an object)
    #[error("{sidecar} cannot be written as {format}")]
    UnsupportedFormat {
        sidecar: &'static str,
        format: OutputFormat,
    },

    /// Payload rejected at construction or could not be encoded
    #[error("Invalid {sidecar} payload: {message}")]
    InvalidPayload {
        sidecar: &'static str,
        message: String,
    },
}

/// Result type for sidecar operations
pub type Result<T> = std::result::Result<T, SidecarError>;

/// Errors walking the reorganized tree
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Output directory not found: {0}")]
    OutputNotFound(PathBuf),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors reading signal file headers
///
/// Never escapes the metadata collaborator: callers get placeholder data.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid EDF header: {0}")]
    InvalidHeader(String),

    #[error("EDF file has no data signals")]
    NoDataSignals,
}
