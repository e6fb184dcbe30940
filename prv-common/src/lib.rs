//! # PRV Common Library
//!
//! Shared code for the PRV reorganizer and sidecar generator:
//! - Error types
//! - Configuration loading (TOML + environment + CLI priority)
//! - Logging handle
//! - Canonical dataset layout naming
//! - Channel type classification

pub mod channels;
pub mod config;
pub mod error;
pub mod layout;
pub mod logging;

pub use channels::{ChannelCounts, ChannelType};
pub use error::{Error, Result};
pub use logging::LogHandle;
