//! Common error types for the PRV BIDS tools

use thiserror::Error;

/// Common result type for PRV BIDS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the reorganizer and the sidecar generator
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    ///
    /// Fatal for a run: nothing can be resolved without a usable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Logging could not be set up
    #[error("Logging error: {0}")]
    Logging(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
