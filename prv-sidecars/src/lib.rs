//! # PRV sidecar generator
//!
//! Scans a reorganized PRV session tree and writes BIDS metadata sidecars next
//! to the recordings:
//! - `*_eeg.json` recording metadata per session
//! - `*_channels.tsv` channel table per session
//! - `*_sessions.tsv` session table per subject
//! - `dataset_description.json` per dataset (optional)

pub mod edf;
pub mod error;
pub mod orchestrator;
pub mod scanner;
pub mod sidecar;
pub mod signal;

pub use error::{OutputFormat, ScanError, SidecarError, SignalError, ValidationError, ValidationIssue};
pub use orchestrator::{GenerationSummary, SidecarGenerator, Tally};
pub use scanner::{HierarchyScanner, RejectedSession, ScanReport, SessionRecord};
pub use sidecar::{PathOptions, Sidecar};
pub use signal::{EdfHeaderSource, PlaceholderSource, SignalMetadataSource};
