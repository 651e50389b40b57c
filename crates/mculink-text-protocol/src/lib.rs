//! R8C Text UART Protocol
//!
//! This crate provides types and utilities for talking to the R8C supervisory
//! MCU found on I-O DATA LAN DISK boards. Unlike the MICON binary framing,
//! the R8C speaks a line-based ASCII protocol where the first byte of every
//! line says what kind of line it is.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → MCU): `:<verb>[ <arg>]\n`
//! - **Replies** (MCU → host): `;<payload>\n`
//! - **Events** (MCU → host, unsolicited): `@<code>`, e.g. `@P` when the
//!   power button is pressed and `@p` when it is released
//!
//! Replies carry no command identifier; only one command may be in flight.
//!
//! # Example
//!
//! ```rust
//! use mculink_text_protocol::{Inbound, LineCodec, TextCommand};
//!
//! let cmd = TextCommand::new("temp");
//! assert_eq!(cmd.encode().unwrap(), b":temp\n".to_vec());
//!
//! let mut codec = LineCodec::new();
//! codec.push(b";25\n");
//! assert_eq!(codec.decode(), Some(Inbound::Reply("25".to_string())));
//! ```

mod codec;
mod commands;
mod error;

pub use codec::*;
pub use commands::*;
pub use error::*;
