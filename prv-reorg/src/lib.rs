//! prv-reorg library
//!
//! Turns a flat directory of `PRV-{site}-{patient}-{age}…` EDF/XML files into
//! the canonical per-patient, per-session tree.

pub mod allow_list;
pub mod builder;
pub mod discovery;
pub mod error;
pub mod identity;

pub use allow_list::AllowList;
pub use builder::{BuildReport, HierarchyBuilder};
pub use discovery::{discover, Discovery};
pub use error::{ParseError, ReorgError, Result};
pub use identity::{FileExtension, FileIdentity};
