//! Error types for the scheduler library.

use thiserror::Error;

/// Errors that can surface from the scheduler core or its collaborators.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The Persistence Port failed to read, write, or enumerate a record.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The Send Port returned an error rather than a boolean outcome.
    #[error("send error: {0}")]
    Send(String),

    /// Configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A caller supplied a malformed message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SchedulerError>;
