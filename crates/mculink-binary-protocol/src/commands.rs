//! Command frames sent to the MCU.

use crate::constants::*;
use crate::error::{BinaryError, BinaryResult};

/// Operation carried in the high bit of the first frame byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Read a value from the MCU.
    Read,
    /// Write a value (or trigger an action) on the MCU.
    Write,
}

impl Op {
    /// Extract the operation from the first frame byte.
    pub fn from_header(byte: u8) -> Self {
        if byte & OP_MASK == OP_READ {
            Op::Read
        } else {
            Op::Write
        }
    }

    /// The operation bit for this operation.
    pub fn bits(&self) -> u8 {
        match self {
            Op::Read => OP_READ,
            Op::Write => OP_WRITE,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Read => f.write_str("read"),
            Op::Write => f.write_str("write"),
        }
    }
}

/// Two's-complement checksum of `bytes`: the value that makes the sum of
/// `bytes` plus the checksum equal to zero modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Sum of all bytes modulo 256. Zero for every well-formed frame.
pub fn frame_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// A request to the MCU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Read or write.
    pub op: Op,
    /// Command id.
    pub cmd: u8,
    /// Request payload (at most [`MAX_PAYLOAD_LEN`] bytes).
    payload: Vec<u8>,
    /// Skip the device-error lookup on the reply.
    ///
    /// Some commands legitimately answer with a single byte in the error code
    /// range; the caller decides which interpretation applies.
    pub ignore_device_errors: bool,
}

impl CommandFrame {
    /// Build a command frame, checking the payload length.
    pub fn new(op: Op, cmd: u8, payload: &[u8]) -> BinaryResult<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(BinaryError::PayloadTooLong {
                max: MAX_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        Ok(CommandFrame {
            op,
            cmd,
            payload: payload.to_vec(),
            ignore_device_errors: false,
        })
    }

    /// A read request. Reads never carry a payload.
    pub fn read(cmd: u8) -> Self {
        CommandFrame {
            op: Op::Read,
            cmd,
            payload: Vec::new(),
            ignore_device_errors: false,
        }
    }

    /// A write request carrying `payload`.
    pub fn write(cmd: u8, payload: &[u8]) -> BinaryResult<Self> {
        Self::new(Op::Write, cmd, payload)
    }

    /// A write request without payload (a "flag" command).
    pub fn flag(cmd: u8) -> Self {
        CommandFrame {
            op: Op::Write,
            cmd,
            payload: Vec::new(),
            ignore_device_errors: false,
        }
    }

    /// Treat one-byte replies as data even when they look like error codes.
    pub fn ignoring_device_errors(mut self) -> Self {
        self.ignore_device_errors = true;
        self
    }

    /// Request payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode the frame for transmission, including the checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        buf.push(self.op.bits() | (self.payload.len() as u8 & LEN_MASK));
        buf.push(self.cmd);
        buf.extend_from_slice(&self.payload);
        buf.push(checksum(&buf));
        buf
    }
}
