//! Wire dialects.
//!
//! A [`Dialect`] tells the transaction engine how to put a request on the
//! wire, how to split inbound bytes into replies and events, and how to turn
//! a reply into the caller's result. The engine itself never looks at bytes.

use std::fmt;
use std::time::Duration;

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};

mod binary;
mod text;

pub use binary::{Binary, MiconInfo};
pub use text::{R8cInfo, Text, KNOWN_MODELS};

/// An item decoded from inbound bytes.
#[derive(Debug)]
pub enum Received<F> {
    /// A reply frame for the outstanding transaction.
    Reply(F),
    /// An unsolicited event code.
    Event(u8),
    /// Inbound data that could not be decoded. The decoder has been reset.
    Malformed(LinkError),
}

/// Framing convention of one MCU family.
pub trait Dialect: Send + Sync + 'static {
    /// A request as built by callers.
    type Request: fmt::Debug + Send + 'static;
    /// A decoded reply frame, before correlation.
    type Frame: fmt::Debug + Send;
    /// What a successful transaction returns.
    type Reply: fmt::Debug + Send + 'static;
    /// Incremental decoder state, including the receive buffer.
    type Decoder: Send + 'static;

    /// Dialect name used in logs and metric labels.
    const NAME: &'static str;
    /// Reply timeout when the configuration does not set one.
    const DEFAULT_TIMEOUT: Duration;

    /// A fresh decoder for a link opened with `config`.
    fn decoder(config: &LinkConfig) -> Self::Decoder;

    /// Drop any partially received frame.
    fn reset(decoder: &mut Self::Decoder);

    /// Encode `request`, rejecting requests that cannot be sent.
    fn encode(request: &Self::Request) -> LinkResult<Vec<u8>>;

    /// Whether the caller has to wait for a reply.
    fn expects_reply(request: &Self::Request, reply_len: usize) -> bool;

    /// Feed received bytes, appending every complete item to `out`.
    fn decode(decoder: &mut Self::Decoder, data: &[u8], out: &mut Vec<Received<Self::Frame>>);

    /// Check `frame` against `request` and extract at most `reply_len` units
    /// of reply payload.
    fn complete(
        request: &Self::Request,
        frame: Self::Frame,
        reply_len: usize,
    ) -> LinkResult<Self::Reply>;

    /// The reply of a request that does not wait.
    fn empty_reply() -> Self::Reply;
}
