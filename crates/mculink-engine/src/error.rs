//! Error types for link operations.

use std::io;
use std::time::Duration;

use mculink_binary_protocol::{BinaryError, DeviceError};
use mculink_text_protocol::TextError;
use thiserror::Error;

/// Errors returned by [`Link`](crate::Link) operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No reply arrived within the link timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Inbound data could not be decoded while a transaction was outstanding.
    #[error("framing error: {0}")]
    Framing(String),

    /// The reply does not belong to the outstanding request.
    #[error("correlation error: expected {expected}, got {got}")]
    Correlation {
        /// Operation and command id of the request.
        expected: String,
        /// Operation and command id of the reply.
        got: String,
    },

    /// The MCU answered with an error code.
    #[error("device error on command 0x{cmd:02X}: {error}")]
    Device {
        /// Command the error was reported for.
        cmd: u8,
        /// Decoded device error.
        error: DeviceError,
    },

    /// The request cannot be sent as given.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A typed read received fewer or more bytes than its type needs.
    #[error("reply has {actual} bytes, expected {expected}")]
    ShortReply {
        /// Bytes the typed read needs.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// The MCU identified itself as a model this crate does not drive.
    #[error("unsupported device: {0}")]
    Unsupported(String),

    /// The byte transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The link configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The link this handle refers to has been dropped.
    #[error("link detached")]
    Detached,
}

impl LinkError {
    /// Short outcome label used in metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            LinkError::Timeout(_) => "timeout",
            LinkError::Framing(_) => "framing",
            LinkError::Correlation { .. } => "correlation",
            LinkError::Device { .. } => "device",
            LinkError::Argument(_) => "argument",
            LinkError::ShortReply { .. } => "short_reply",
            LinkError::Unsupported(_) => "unsupported",
            LinkError::Transport(_) => "transport",
            LinkError::Config(_) => "config",
            LinkError::Detached => "detached",
        }
    }

    /// The device error carried by this error, if any.
    pub fn device_error(&self) -> Option<DeviceError> {
        match self {
            LinkError::Device { error, .. } => Some(*error),
            _ => None,
        }
    }
}

impl From<BinaryError> for LinkError {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::Mismatch {
                expected_op,
                expected_cmd,
                op,
                cmd,
            } => LinkError::Correlation {
                expected: format!("{expected_op}/0x{expected_cmd:02X}"),
                got: format!("{op}/0x{cmd:02X}"),
            },
            BinaryError::Device { cmd, error } => LinkError::Device { cmd, error },
            BinaryError::PayloadTooLong { .. } => LinkError::Argument(err.to_string()),
            other => LinkError::Framing(other.to_string()),
        }
    }
}

impl From<TextError> for LinkError {
    fn from(err: TextError) -> Self {
        match err {
            TextError::InvalidCommand(_) => LinkError::Argument(err.to_string()),
            TextError::LineTooLong { .. } => LinkError::Framing(err.to_string()),
        }
    }
}

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
