//! Error types for the backtesting core.

use thiserror::Error;

/// Result type alias used by the core modules.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by simulation, statistics and data loading.
#[derive(Error, Debug)]
pub enum Error {
    /// Input series or panel cannot be processed (missing columns, no time order, bad values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration values outside their allowed ranges
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// True for failures caused by the caller's data rather than the environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}
