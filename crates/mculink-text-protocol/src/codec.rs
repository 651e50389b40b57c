//! Line-based codec for R8C communication.
//!
//! Inbound data is classified by its leading byte: `;` starts a reply line
//! that runs to the next `\n`, `@` is followed by a single event code that is
//! complete as soon as it arrives. Everything else (line terminators, echoed
//! command lines, noise) is skipped.

use bytes::{Buf, BytesMut};

use crate::error::TextError;

/// Maximum command/reply line length, including prefix and newline.
pub const MAX_LINE_LENGTH: usize = 64;

/// Prefix of a command line (host → MCU).
pub const CMD_PREFIX: u8 = b':';
/// Prefix of a reply line (MCU → host).
pub const REPLY_PREFIX: u8 = b';';
/// Prefix of an event (MCU → host).
pub const EVENT_PREFIX: u8 = b'@';

/// An inbound item decoded from the MCU's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Reply payload with the prefix and line terminator removed.
    Reply(String),
    /// Event code (the byte following `@`).
    Event(u8),
    /// A reply line that could not be completed. The buffer has been reset.
    Malformed(TextError),
}

/// A codec accumulating MCU output into replies and events.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH * 2),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next reply or event from the buffer.
    ///
    /// Returns `None` when more data is needed.
    pub fn decode(&mut self) -> Option<Inbound> {
        loop {
            let first = *self.buffer.first()?;
            match first {
                EVENT_PREFIX => {
                    let code = *self.buffer.get(1)?;
                    if code == b'\r' || code == b'\n' {
                        log::debug!("event prefix without code");
                        self.buffer.advance(1);
                        continue;
                    }
                    self.buffer.advance(2);
                    return Some(Inbound::Event(code));
                }
                REPLY_PREFIX => return self.decode_reply(),
                b'\r' | b'\n' => self.buffer.advance(1),
                _ => self.skip_noise(),
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    ///
    /// A trailing `@` still waiting for its event code is kept.
    pub fn clear(&mut self) {
        let awaiting_code = self.buffer.last() == Some(&EVENT_PREFIX);
        self.buffer.clear();
        if awaiting_code {
            self.buffer.extend_from_slice(&[EVENT_PREFIX]);
        }
    }

    fn decode_reply(&mut self) -> Option<Inbound> {
        let mut end = None;
        let mut i = 1;
        while i < self.buffer.len() {
            match self.buffer[i] {
                b'\n' => {
                    end = Some(i);
                    break;
                }
                // Replies never contain '@'; an event landed inside the line.
                EVENT_PREFIX => {
                    let code = *self.buffer.get(i + 1)?;
                    let taken = if code == b'\r' || code == b'\n' { 1 } else { 2 };
                    self.splice_out(i, taken);
                    if taken == 2 {
                        return Some(Inbound::Event(code));
                    }
                }
                _ => i += 1,
            }
        }

        let Some(end) = end else {
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Some(self.overlong(self.buffer.len()));
            }
            return None;
        };

        if end + 1 > MAX_LINE_LENGTH {
            return Some(self.overlong(end + 1));
        }

        let line = self.buffer.split_to(end + 1);
        let mut payload = &line[1..end];
        if let Some(stripped) = payload.strip_suffix(b"\r") {
            payload = stripped;
        }
        Some(Inbound::Reply(String::from_utf8_lossy(payload).into_owned()))
    }

    /// Remove `len` bytes at `at`, keeping the rest of the buffer in order.
    fn splice_out(&mut self, at: usize, len: usize) {
        let total = self.buffer.len();
        self.buffer.copy_within(at + len.., at);
        self.buffer.truncate(total - len);
    }

    fn overlong(&mut self, actual: usize) -> Inbound {
        log::debug!("reply line overflow ({actual} bytes)");
        self.buffer.clear();
        Inbound::Malformed(TextError::LineTooLong {
            max: MAX_LINE_LENGTH,
            actual,
        })
    }

    /// Drop bytes up to the end of the current line or the next prefix.
    fn skip_noise(&mut self) {
        let boundary = self
            .buffer
            .iter()
            .position(|&b| b == b'\n' || b == REPLY_PREFIX || b == EVENT_PREFIX);
        let skipped = match boundary {
            Some(i) if self.buffer[i] == b'\n' => i + 1,
            Some(i) => i,
            None => self.buffer.len(),
        };
        log::trace!(
            "skipping {:?}",
            String::from_utf8_lossy(&self.buffer[..skipped])
        );
        self.buffer.advance(skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reply() {
        let mut codec = LineCodec::new();
        codec.push(b";25\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("25".to_string())));
        assert!(codec.decode().is_none());
    }

    #[test]
    fn test_decode_reply_crlf() {
        let mut codec = LineCodec::new();
        codec.push(b";HDL2-A\r\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("HDL2-A".to_string())));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_partial_reply() {
        let mut codec = LineCodec::new();
        codec.push(b";2");
        assert!(codec.decode().is_none());

        codec.push(b"5\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("25".to_string())));
    }

    #[test]
    fn test_decode_event_without_newline() {
        let mut codec = LineCodec::new();
        codec.push(b"@R");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'R')));
        assert!(codec.decode().is_none());
    }

    #[test]
    fn test_event_prefix_waits_for_code() {
        let mut codec = LineCodec::new();
        codec.push(b"@");
        assert!(codec.decode().is_none());
        codec.push(b"p");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'p')));
    }

    #[test]
    fn test_event_interleaved_with_reply() {
        let mut codec = LineCodec::new();
        codec.push(b"@R\n;40 45\n@r");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'R')));
        assert_eq!(codec.decode(), Some(Inbound::Reply("40 45".to_string())));
        assert_eq!(codec.decode(), Some(Inbound::Event(b'r')));
        assert!(codec.decode().is_none());
    }

    #[test]
    fn test_event_inside_reply_line() {
        let mut codec = LineCodec::new();
        codec.push(b";40 4");
        assert!(codec.decode().is_none());
        codec.push(b"@R");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'R')));
        assert!(codec.decode().is_none());
        codec.push(b"5\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("40 45".to_string())));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_event_inside_reply_line_waits_for_code() {
        let mut codec = LineCodec::new();
        codec.push(b";2@");
        assert!(codec.decode().is_none());
        codec.push(b"P5\n");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'P')));
        assert_eq!(codec.decode(), Some(Inbound::Reply("25".to_string())));
    }

    #[test]
    fn test_clear_keeps_pending_event_prefix() {
        let mut codec = LineCodec::new();
        codec.push(b";stale@");
        codec.clear();
        assert_eq!(codec.buffered_len(), 1);
        codec.push(b"R;25\n");
        assert_eq!(codec.decode(), Some(Inbound::Event(b'R')));
        assert_eq!(codec.decode(), Some(Inbound::Reply("25".to_string())));

        codec.push(b";partial");
        codec.clear();
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_skips_echo_and_noise() {
        let mut codec = LineCodec::new();
        codec.push(b":temp\n\r\n;31\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("31".to_string())));

        codec.push(b"garbage;ok\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("ok".to_string())));
    }

    #[test]
    fn test_empty_reply() {
        let mut codec = LineCodec::new();
        codec.push(b";\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply(String::new())));
    }

    #[test]
    fn test_overlong_reply() {
        let mut codec = LineCodec::new();
        let mut line = vec![REPLY_PREFIX];
        line.extend(std::iter::repeat(b'9').take(MAX_LINE_LENGTH));
        codec.push(&line);
        assert!(matches!(
            codec.decode(),
            Some(Inbound::Malformed(TextError::LineTooLong { .. }))
        ));
        assert_eq!(codec.buffered_len(), 0);

        codec.push(b";1\n");
        assert_eq!(codec.decode(), Some(Inbound::Reply("1".to_string())));
    }
}
