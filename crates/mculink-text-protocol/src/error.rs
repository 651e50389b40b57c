//! Error types for the text protocol.

use thiserror::Error;

/// Errors that can occur when working with the text protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// Invalid command format.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Command line or reply line too long.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Result type alias for text protocol operations.
pub type TextResult<T> = Result<T, TextError>;
