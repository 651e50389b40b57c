//! Transaction engine for supervisory MCUs on a serial line.
//!
//! NAS boards from several vendors put a small microcontroller next to the
//! SoC that owns the power button, fans, LEDs and buzzer. The host talks to
//! it over a UART, one request at a time. This crate provides the shared
//! part of such drivers:
//!
//! - [`Link`]: serialized request/reply transactions with correlation and a
//!   timeout-bounded wait
//! - [`EventDispatcher`]: priority-ordered delivery of unsolicited MCU events
//!   on a dedicated thread
//! - [`dialect`]: the framing of the two supported MCU families, [`Binary`]
//!   (MICON v2) and [`Text`] (R8C)
//! - [`transport`]: adapters between a link and an open byte stream
//!
//! # Example
//!
//! ```rust
//! use mculink_engine::{ChannelTransport, Link, LinkConfig, Text};
//!
//! let (host, device) = ChannelTransport::pair();
//! let link = Link::<Text>::open(host, LinkConfig::text()).unwrap();
//! let receiver = link.receiver();
//!
//! // A stand-in for the R8C answering one command.
//! let mcu = std::thread::spawn(move || {
//!     assert_eq!(device.recv().unwrap(), b":temp\n".to_vec());
//!     receiver.receive(b";25\n").unwrap();
//! });
//!
//! assert_eq!(link.command("temp", None, 8).unwrap(), "25");
//! mcu.join().unwrap();
//! ```

pub mod config;
pub mod dialect;
pub mod dispatcher;
pub mod error;
pub mod link;
mod transaction;
pub mod transport;

pub use config::LinkConfig;
pub use dialect::{Binary, Dialect, MiconInfo, R8cInfo, Text};
pub use dispatcher::{
    EventDispatcher, Flow, Subscription, SubscriptionId, DEFAULT_PRIORITY,
    SHUTDOWN_TIMEOUT,
};
pub use error::{LinkError, LinkResult};
pub use link::{Link, LinkReceiver, LinkStats, WeakLink};
pub use transport::{ByteSink, ChannelTransport, DeviceEnd, ReadPump, WriteSink};

pub use mculink_binary_protocol as binary_protocol;
pub use mculink_text_protocol as text_protocol;
