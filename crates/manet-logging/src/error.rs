//! Errors raised while installing the subscriber

use thiserror::Error;

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory or file could not be created
    #[error("failed to open log output: {0}")]
    Io(#[from] std::io::Error),

    /// A filter directive did not parse
    #[error("invalid filter directive: {0}")]
    Filter(String),

    /// Another global subscriber is already installed
    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
