//! MICON v2 Binary UART Protocol
//!
//! This crate provides types and utilities for talking to the supervisory MCU
//! found on Buffalo TeraStation boards. Every exchange is a single framed
//! request answered by a single framed reply with the same operation and
//! command id.
//!
//! # Protocol Overview
//!
//! ```text
//! +-----------------+--------+-------------------+----------+
//! | op | len (7bit) |  cmd   | payload[0..len]   | checksum |
//! +-----------------+--------+-------------------+----------+
//! ```
//!
//! - **op**: high bit of the first byte, `0x80` for a read, `0x00` for a write
//! - **len**: payload length (0..=32) in the low seven bits
//! - **checksum**: two's complement of the sum of every preceding byte, so
//!   the whole frame sums to zero modulo 256
//!
//! The MCU answers a failed command with a one-byte payload carrying an error
//! code (see [`DeviceError`]).
//!
//! # Example
//!
//! ```rust
//! use mculink_binary_protocol::{CommandFrame, Decoded, FrameDecoder};
//!
//! let cmd = CommandFrame::write(0x50, &[0x0f]).unwrap();
//! assert_eq!(cmd.encode(), vec![0x01, 0x50, 0x0f, 0xa0]);
//!
//! let mut decoder = FrameDecoder::new();
//! match decoder.push(&[0x81, 0x46, 0x02, 0x37]) {
//!     Decoded::Frame(reply) => assert_eq!(reply.payload, vec![0x02]),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod responses;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use responses::*;
