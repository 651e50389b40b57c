//! Text dialect (LAN DISK R8C).

use std::time::Duration;

use mculink_text_protocol::{
    Inbound, LineCodec, TextCommand, MAX_LINE_LENGTH, VERB_MODEL, VERB_VERSION,
};
use tracing::info;

use super::{Dialect, Received};
use crate::config::{LinkConfig, TEXT_TIMEOUT};
use crate::error::{LinkError, LinkResult};
use crate::link::Link;

/// Models the R8C handshake accepts, matched by prefix.
pub const KNOWN_MODELS: &[&str] = &["HDL-A", "HDL2-A"];

/// Longest model reply read during the handshake.
const MODEL_REPLY_LEN: usize = 12;
/// Longest version reply read during the handshake.
const VERSION_REPLY_LEN: usize = 8;

/// Prefix-tagged ASCII lines. Replies carry no command id; events arrive
/// in band as `@<code>`.
#[derive(Debug, Clone, Copy)]
pub enum Text {}

impl Dialect for Text {
    type Request = TextCommand;
    type Frame = String;
    type Reply = String;
    type Decoder = LineCodec;

    const NAME: &'static str = "text";
    const DEFAULT_TIMEOUT: Duration = TEXT_TIMEOUT;

    fn decoder(_config: &LinkConfig) -> LineCodec {
        LineCodec::new()
    }

    fn reset(decoder: &mut LineCodec) {
        decoder.clear();
    }

    fn encode(request: &TextCommand) -> LinkResult<Vec<u8>> {
        request
            .encode()
            .map_err(|err| LinkError::Argument(err.to_string()))
    }

    fn expects_reply(_request: &TextCommand, reply_len: usize) -> bool {
        reply_len > 0
    }

    fn decode(decoder: &mut LineCodec, data: &[u8], out: &mut Vec<Received<String>>) {
        decoder.push(data);
        while let Some(item) = decoder.decode() {
            out.push(match item {
                Inbound::Reply(line) => Received::Reply(line),
                Inbound::Event(code) => Received::Event(code),
                Inbound::Malformed(err) => Received::Malformed(err.into()),
            });
        }
    }

    fn complete(_request: &TextCommand, mut line: String, reply_len: usize) -> LinkResult<String> {
        if line.len() > reply_len {
            let mut end = reply_len;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
        }
        Ok(line)
    }

    fn empty_reply() -> String {
        String::new()
    }
}

/// What the R8C reported during [`Link::handshake`](Link<Text>::handshake).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R8cInfo {
    /// Known model the reply matched.
    pub model: &'static str,
    /// Model string as reported.
    pub model_reply: String,
    /// Firmware version.
    pub version: String,
}

impl Link<Text> {
    /// Run `verb` with an optional argument and return up to `reply_len`
    /// bytes of the reply. With `reply_len == 0` nothing is awaited.
    pub fn command(&self, verb: &str, arg: Option<&str>, reply_len: usize) -> LinkResult<String> {
        let command = match arg {
            Some(arg) => TextCommand::with_arg(verb, arg),
            None => TextCommand::new(verb),
        };
        self.execute(command, reply_len)
    }

    /// Send `verb` without waiting for a reply.
    pub fn send(&self, verb: &str, arg: Option<&str>) -> LinkResult<()> {
        self.command(verb, arg, 0)?;
        Ok(())
    }

    /// Run a raw command line such as `sts on` or `:thget\n` and return the
    /// reply.
    pub fn raw(&self, line: &str) -> LinkResult<String> {
        let command = TextCommand::from_raw_line(line)?;
        self.execute(command, MAX_LINE_LENGTH)
    }

    /// Identify the R8C.
    pub fn handshake(&self) -> LinkResult<R8cInfo> {
        let model_reply = self.command(VERB_MODEL, None, MODEL_REPLY_LEN)?;
        if model_reply.is_empty() {
            return Err(LinkError::Unsupported("empty model reply".to_string()));
        }
        let version = self.command(VERB_VERSION, None, VERSION_REPLY_LEN)?;
        if version.is_empty() {
            return Err(LinkError::Unsupported("empty version reply".to_string()));
        }

        let model = KNOWN_MODELS
            .iter()
            .copied()
            .find(|known| model_reply.starts_with(known))
            .ok_or_else(|| LinkError::Unsupported(format!("unknown model {model_reply:?}")))?;
        info!("Link[{}]: MCU: {} v{}", self.name(), model, version);

        Ok(R8cInfo {
            model,
            model_reply,
            version,
        })
    }
}
