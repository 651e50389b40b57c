//! Commands that can be sent to the R8C.
//!
//! A command is a verb with an optional argument. Verbs used by the LAN DISK
//! drivers are listed as constants; the MCU accepts others as well.

use crate::codec::{CMD_PREFIX, MAX_LINE_LENGTH};
use crate::error::{TextError, TextResult};

/// Model name (`HDL-A`, `HDL2-A`, ...).
pub const VERB_MODEL: &str = "model";
/// Firmware version.
pub const VERB_VERSION: &str = "ver";
/// Current temperature.
pub const VERB_TEMP: &str = "temp";
/// Read the temperature threshold.
pub const VERB_THRESHOLD_GET: &str = "thget";
/// Set the temperature threshold.
pub const VERB_THRESHOLD_SET: &str = "thset";
/// Fan speed mode.
pub const VERB_FAN_CONTROL: &str = "fancont";
/// Status LED mode.
pub const VERB_STATUS: &str = "sts";
/// HDD LED.
pub const VERB_HDD: &str = "hdd";
/// LED control.
pub const VERB_LED: &str = "led";
/// System reset.
pub const VERB_RESET: &str = "reset";
/// Power off.
pub const VERB_POWER_OFF: &str = "poweroff";
/// Power-on behaviour after AC loss.
pub const VERB_AC_INTERRUPT: &str = "intrp";

/// Longest raw line accepted by [`TextCommand::from_raw_line`], leaving room
/// for the prefix and the newline.
pub const MAX_RAW_LINE_LENGTH: usize = MAX_LINE_LENGTH - 2;

/// A command line for the R8C.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCommand {
    verb: String,
    arg: Option<String>,
}

impl TextCommand {
    /// A command without argument.
    pub fn new(verb: impl Into<String>) -> Self {
        TextCommand {
            verb: verb.into(),
            arg: None,
        }
    }

    /// A command with an argument.
    pub fn with_arg(verb: impl Into<String>, arg: impl Into<String>) -> Self {
        TextCommand {
            verb: verb.into(),
            arg: Some(arg.into()),
        }
    }

    /// Parse a raw command line as typed by an operator.
    ///
    /// A leading `:` and a trailing newline are optional. The first space
    /// separates the verb from the argument.
    pub fn from_raw_line(line: &str) -> TextResult<Self> {
        if line.is_empty() || line.len() > MAX_RAW_LINE_LENGTH {
            return Err(TextError::InvalidCommand(format!(
                "raw line must be 1..={MAX_RAW_LINE_LENGTH} bytes, got {}",
                line.len()
            )));
        }

        let body = line.strip_prefix(char::from(CMD_PREFIX)).unwrap_or(line);
        let body = body.strip_suffix('\n').unwrap_or(body);
        if body.is_empty() {
            return Err(TextError::InvalidCommand("empty command".to_string()));
        }

        let command = match body.split_once(' ') {
            Some((verb, arg)) => TextCommand::with_arg(verb, arg),
            None => TextCommand::new(body),
        };
        command.validate()?;
        Ok(command)
    }

    /// The command verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The command argument, if any.
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    /// Check that the command can be put on the wire as a single line.
    pub fn validate(&self) -> TextResult<()> {
        if self.verb.is_empty() {
            return Err(TextError::InvalidCommand("empty verb".to_string()));
        }
        if self
            .verb
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
        {
            return Err(TextError::InvalidCommand(format!(
                "verb {:?} contains whitespace or control characters",
                self.verb
            )));
        }
        if let Some(arg) = &self.arg {
            if arg.bytes().any(|b| b == b'\n' || b == b'\r') {
                return Err(TextError::InvalidCommand(format!(
                    "argument {arg:?} contains a line break"
                )));
            }
        }

        let len = self.encoded_len();
        if len > MAX_LINE_LENGTH {
            return Err(TextError::LineTooLong {
                max: MAX_LINE_LENGTH,
                actual: len,
            });
        }
        Ok(())
    }

    /// Encode the command line, including prefix and newline.
    ///
    /// No space is emitted when there is no argument.
    pub fn encode(&self) -> TextResult<Vec<u8>> {
        self.validate()?;
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(CMD_PREFIX);
        buf.extend_from_slice(self.verb.as_bytes());
        if let Some(arg) = &self.arg {
            buf.push(b' ');
            buf.extend_from_slice(arg.as_bytes());
        }
        buf.push(b'\n');
        Ok(buf)
    }

    fn encoded_len(&self) -> usize {
        // prefix + verb + newline (+ space + arg)
        2 + self.verb.len() + self.arg.as_ref().map_or(0, |a| a.len() + 1)
    }
}

impl std::fmt::Display for TextCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{} {}", self.verb, arg),
            None => f.write_str(&self.verb),
        }
    }
}
