//! Incremental frame decoding.
//!
//! Replies arrive from the UART in arbitrary chunks. The decoder accumulates
//! them until the header is known, then until exactly `len + 3` bytes are
//! buffered:
//!
//! ```text
//! +-----------+-----+-------------------+----------+
//! | op | len  | cmd | payload[0..len]   | checksum |
//! +-----------+-----+-------------------+----------+
//! ```
//!
//! Anything that cannot be the tail of the frame in progress (more bytes than
//! the header announced, more than [`MAX_RX_LEN`] bytes, an impossible
//! length) is reported as malformed and the buffer starts over.

use bytes::BytesMut;

use crate::commands::{frame_sum, Op};
use crate::constants::*;
use crate::error::BinaryError;
use crate::responses::ReplyFrame;

/// Result of feeding bytes into a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// More bytes are needed.
    Pending,
    /// A complete reply frame.
    Frame(ReplyFrame),
    /// The input could not be a valid frame. The decoder has been reset.
    Malformed(BinaryError),
}

/// Header fields registered once the first two bytes are in.
#[derive(Debug, Clone, Copy)]
struct Header {
    op: Op,
    len: usize,
    cmd: u8,
}

impl Header {
    fn frame_len(&self) -> usize {
        self.len + FRAME_OVERHEAD
    }
}

/// A decoder accumulating reply bytes into frames.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Header of the frame in progress.
    header: Option<Header>,
    /// Reject frames that do not sum to zero.
    verify_checksum: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder that verifies reply checksums.
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(MAX_RX_LEN),
            header: None,
            verify_checksum: true,
        }
    }

    /// Enable or disable checksum verification of replies.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Feed a received chunk into the decoder.
    pub fn push(&mut self, data: &[u8]) -> Decoded {
        if data.is_empty() {
            return Decoded::Pending;
        }

        let total = self.buffer.len() + data.len();
        if total > MAX_RX_LEN {
            return self.malformed(BinaryError::Overflow {
                limit: MAX_RX_LEN,
                actual: total,
            });
        }
        if let Some(header) = self.header {
            if total > header.frame_len() {
                return self.malformed(BinaryError::Overflow {
                    limit: header.frame_len(),
                    actual: total,
                });
            }
        }
        self.buffer.extend_from_slice(data);

        if self.header.is_none() && self.buffer.len() >= 2 {
            let len = self.buffer[0] & LEN_MASK;
            if usize::from(len) > MAX_PAYLOAD_LEN {
                return self.malformed(BinaryError::InvalidLength(len));
            }
            let header = Header {
                op: Op::from_header(self.buffer[0]),
                len: usize::from(len),
                cmd: self.buffer[1],
            };
            log::trace!(
                "header: op={} len={} cmd=0x{:02x}",
                header.op,
                header.len,
                header.cmd
            );
            if self.buffer.len() > header.frame_len() {
                let actual = self.buffer.len();
                return self.malformed(BinaryError::Overflow {
                    limit: header.frame_len(),
                    actual,
                });
            }
            self.header = Some(header);
        }

        match self.header {
            Some(header) if self.buffer.len() == header.frame_len() => {
                let frame = self.buffer.split();
                self.header = None;

                if self.verify_checksum {
                    let sum = frame_sum(&frame);
                    if sum != 0 {
                        return Decoded::Malformed(BinaryError::ChecksumMismatch(sum));
                    }
                }

                Decoded::Frame(ReplyFrame {
                    op: header.op,
                    cmd: header.cmd,
                    payload: frame[2..2 + header.len].to_vec(),
                })
            }
            _ => Decoded::Pending,
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.header = None;
    }

    fn malformed(&mut self, error: BinaryError) -> Decoded {
        log::debug!("malformed frame: {error}");
        self.reset();
        Decoded::Malformed(error)
    }
}
