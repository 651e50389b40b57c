//! Reply frames received from the MCU.

use crate::commands::{CommandFrame, Op};
use crate::error::{BinaryError, BinaryResult, DeviceError};

/// A complete reply decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Operation echoed by the MCU.
    pub op: Op,
    /// Command id echoed by the MCU.
    pub cmd: u8,
    /// Reply payload (checksum stripped).
    pub payload: Vec<u8>,
}

impl ReplyFrame {
    /// Check this reply against the request it is supposed to answer.
    ///
    /// The reply must echo the request's operation and command id. Unless the
    /// request opted out, a write reply or a one-byte read reply whose first
    /// byte is a known error code is reported as a device error.
    pub fn correlate(self, request: &CommandFrame) -> BinaryResult<Vec<u8>> {
        if self.op != request.op || self.cmd != request.cmd {
            return Err(BinaryError::Mismatch {
                expected_op: request.op,
                expected_cmd: request.cmd,
                op: self.op,
                cmd: self.cmd,
            });
        }

        if !request.ignore_device_errors
            && (request.op == Op::Write || self.payload.len() == 1)
        {
            if let Some(error) = self.device_error() {
                if error.names_command() {
                    log::debug!("{} 0x{:02x}", error.message(), request.cmd);
                } else {
                    log::debug!("{}", error.message());
                }
                return Err(BinaryError::Device {
                    cmd: request.cmd,
                    error,
                });
            }
        }

        Ok(self.payload)
    }

    /// The device error encoded in the first payload byte, if any.
    pub fn device_error(&self) -> Option<DeviceError> {
        self.payload.first().copied().and_then(DeviceError::from_code)
    }
}
