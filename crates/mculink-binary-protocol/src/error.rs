//! Protocol error types.

use thiserror::Error;

use crate::commands::Op;

/// Errors that can occur when encoding or decoding MICON frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinaryError {
    /// Payload does not fit in a single frame.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed payload length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// Received more bytes than the frame (or receive buffer) can hold.
    #[error("receive overflow: limit {limit} bytes, got {actual}")]
    Overflow {
        /// Byte limit that was exceeded.
        limit: usize,
        /// Number of bytes accumulated.
        actual: usize,
    },

    /// Header declares a payload longer than the protocol allows.
    #[error("declared payload length {0} exceeds maximum")]
    InvalidLength(u8),

    /// Frame bytes do not sum to zero.
    #[error("checksum mismatch: frame sums to 0x{0:02X}")]
    ChecksumMismatch(u8),

    /// Reply does not belong to the outstanding request.
    #[error("reply {op}/0x{cmd:02X} does not match request {expected_op}/0x{expected_cmd:02X}")]
    Mismatch {
        /// Operation of the request.
        expected_op: Op,
        /// Command id of the request.
        expected_cmd: u8,
        /// Operation of the reply.
        op: Op,
        /// Command id of the reply.
        cmd: u8,
    },

    /// The MCU reported an error code.
    #[error("device error on command 0x{cmd:02X}: {error}")]
    Device {
        /// Command the error was reported for.
        cmd: u8,
        /// Decoded device error.
        error: DeviceError,
    },
}

/// Result type alias for binary protocol operations.
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Semantic class of a device error, mirroring the errno the MCU code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// Transfer-level failure on the MCU's UART.
    Io,
    /// The command is not supported.
    Unsupported,
    /// The request was rejected as invalid.
    InvalidArgument,
    /// The request carried too much data.
    Overflow,
}

/// Error codes returned by the MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// UART buffer overrun.
    UartOverrun,
    /// UART framing error.
    UartFraming,
    /// UART parity error.
    UartParity,
    /// Unavailable command.
    UnavailableCommand,
    /// Invalid length for command.
    InvalidLength,
    /// Data is larger than 32 bytes.
    DataOverflow,
    /// Invalid checksum on command.
    InvalidChecksum,
}

impl DeviceError {
    /// Look up a device error code. Returns `None` for ordinary data bytes.
    pub fn from_code(code: u8) -> Option<Self> {
        use crate::constants::*;
        match code {
            ERR_CODE_UART_OVERRUN => Some(DeviceError::UartOverrun),
            ERR_CODE_UART_FRAMING => Some(DeviceError::UartFraming),
            ERR_CODE_UART_PARITY => Some(DeviceError::UartParity),
            ERR_CODE_UNAVAILABLE_CMD => Some(DeviceError::UnavailableCommand),
            ERR_CODE_INVALID_LEN => Some(DeviceError::InvalidLength),
            ERR_CODE_DATA_OVERFLOW => Some(DeviceError::DataOverflow),
            ERR_CODE_INVALID_CHECKSUM => Some(DeviceError::InvalidChecksum),
            _ => None,
        }
    }

    /// The wire code of this error.
    pub fn code(&self) -> u8 {
        use crate::constants::*;
        match self {
            DeviceError::UartOverrun => ERR_CODE_UART_OVERRUN,
            DeviceError::UartFraming => ERR_CODE_UART_FRAMING,
            DeviceError::UartParity => ERR_CODE_UART_PARITY,
            DeviceError::UnavailableCommand => ERR_CODE_UNAVAILABLE_CMD,
            DeviceError::InvalidLength => ERR_CODE_INVALID_LEN,
            DeviceError::DataOverflow => ERR_CODE_DATA_OVERFLOW,
            DeviceError::InvalidChecksum => ERR_CODE_INVALID_CHECKSUM,
        }
    }

    /// Semantic class of the error.
    pub fn kind(&self) -> DeviceErrorKind {
        match self {
            DeviceError::UartOverrun | DeviceError::UartFraming | DeviceError::UartParity => {
                DeviceErrorKind::Io
            }
            DeviceError::UnavailableCommand => DeviceErrorKind::Unsupported,
            DeviceError::InvalidLength | DeviceError::InvalidChecksum => {
                DeviceErrorKind::InvalidArgument
            }
            DeviceError::DataOverflow => DeviceErrorKind::Overflow,
        }
    }

    /// Whether the error is about the specific command (as opposed to the line).
    pub fn names_command(&self) -> bool {
        !matches!(self.kind(), DeviceErrorKind::Io)
    }

    /// Human-readable message for the error.
    pub fn message(&self) -> &'static str {
        match self {
            DeviceError::UartOverrun => "(UART) buffer overrun",
            DeviceError::UartFraming => "(UART) framing error",
            DeviceError::UartParity => "(UART) parity error",
            DeviceError::UnavailableCommand => "unavailable command",
            DeviceError::InvalidLength => "invalid length for command",
            DeviceError::DataOverflow => "data is larger than 32 on command",
            DeviceError::InvalidChecksum => "invalid checksum on command",
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.message(), self.code())
    }
}
