//! Binary dialect (TeraStation MICON v2).

use std::thread;
use std::time::Duration;

use mculink_binary_protocol::{
    CommandFrame, Decoded, FrameDecoder, ReplyFrame, CMD_BOOT_END, CMD_GET_VER, CMD_PWR_STATE,
    CMD_SERMOD_CON, MAX_PAYLOAD_LEN, PWR_STAT_COLD_BOOT, PWR_STAT_POWER_OFF, PWR_STAT_RUNNING,
};
use tracing::{info, warn};

use super::{Dialect, Received};
use crate::config::{LinkConfig, BINARY_TIMEOUT};
use crate::error::{LinkError, LinkResult};
use crate::link::Link;

/// Length-prefixed, checksummed frames. Every request is acknowledged, and
/// events arrive out of band through [`Link::notify_event`].
#[derive(Debug, Clone, Copy)]
pub enum Binary {}

impl Dialect for Binary {
    type Request = CommandFrame;
    type Frame = ReplyFrame;
    type Reply = Vec<u8>;
    type Decoder = FrameDecoder;

    const NAME: &'static str = "binary";
    const DEFAULT_TIMEOUT: Duration = BINARY_TIMEOUT;

    fn decoder(config: &LinkConfig) -> FrameDecoder {
        FrameDecoder::new().with_checksum_verification(config.verify_checksum)
    }

    fn reset(decoder: &mut FrameDecoder) {
        decoder.reset();
    }

    fn encode(request: &CommandFrame) -> LinkResult<Vec<u8>> {
        Ok(request.encode())
    }

    fn expects_reply(_request: &CommandFrame, _reply_len: usize) -> bool {
        true
    }

    fn decode(decoder: &mut FrameDecoder, data: &[u8], out: &mut Vec<Received<ReplyFrame>>) {
        match decoder.push(data) {
            Decoded::Pending => {}
            Decoded::Frame(frame) => out.push(Received::Reply(frame)),
            Decoded::Malformed(err) => out.push(Received::Malformed(err.into())),
        }
    }

    fn complete(request: &CommandFrame, frame: ReplyFrame, reply_len: usize) -> LinkResult<Vec<u8>> {
        let mut payload = frame.correlate(request)?;
        payload.truncate(reply_len);
        Ok(payload)
    }

    fn empty_reply() -> Vec<u8> {
        Vec::new()
    }
}

/// What the MICON reported during [`Link::handshake`](Link<Binary>::handshake).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiconInfo {
    /// Model/version string.
    pub version: String,
    /// Power state at boot (2: cold boot, 3: running, 4: restart, 5: off).
    pub power_state: u8,
}

impl Link<Binary> {
    /// Read up to `reply_len` bytes from command `cmd`.
    pub fn read(&self, cmd: u8, reply_len: usize) -> LinkResult<Vec<u8>> {
        self.execute(CommandFrame::read(cmd), reply_len)
    }

    /// Write `payload` to command `cmd`.
    pub fn write(&self, cmd: u8, payload: &[u8]) -> LinkResult<()> {
        self.execute(CommandFrame::write(cmd, payload)?, 0)?;
        Ok(())
    }

    /// Send command `cmd` as a write without payload.
    pub fn write_flag(&self, cmd: u8) -> LinkResult<()> {
        self.execute(CommandFrame::flag(cmd), 0)?;
        Ok(())
    }

    fn read_exact<const N: usize>(&self, request: CommandFrame) -> LinkResult<[u8; N]> {
        let reply = self.execute(request, N)?;
        <[u8; N]>::try_from(reply.as_slice()).map_err(|_| LinkError::ShortReply {
            expected: N,
            actual: reply.len(),
        })
    }

    /// Read a one-byte value.
    pub fn read_u8(&self, cmd: u8) -> LinkResult<u8> {
        self.read_exact::<1>(CommandFrame::read(cmd)).map(|[v]| v)
    }

    /// Read a one-byte value that may legitimately fall in the error-code
    /// range.
    pub fn read_u8_lenient(&self, cmd: u8) -> LinkResult<u8> {
        self.read_exact::<1>(CommandFrame::read(cmd).ignoring_device_errors())
            .map(|[v]| v)
    }

    /// Read a big-endian 16-bit value.
    pub fn read_u16(&self, cmd: u8) -> LinkResult<u16> {
        self.read_exact(CommandFrame::read(cmd)).map(u16::from_be_bytes)
    }

    /// Read a big-endian 32-bit value.
    pub fn read_u32(&self, cmd: u8) -> LinkResult<u32> {
        self.read_exact(CommandFrame::read(cmd)).map(u32::from_be_bytes)
    }

    /// Write a one-byte value.
    pub fn write_u8(&self, cmd: u8, value: u8) -> LinkResult<()> {
        self.write(cmd, &[value])
    }

    /// Write a big-endian 16-bit value.
    pub fn write_u16(&self, cmd: u8, value: u16) -> LinkResult<()> {
        self.write(cmd, &value.to_be_bytes())
    }

    /// Write a big-endian 32-bit value.
    pub fn write_u32(&self, cmd: u8, value: u32) -> LinkResult<()> {
        self.write(cmd, &value.to_be_bytes())
    }

    /// Bring the MICON out of its boot state and identify it.
    ///
    /// Switches the MICON to console serial mode unless it reports a
    /// restart, since switching again breaks console input.
    pub fn handshake(&self) -> LinkResult<MiconInfo> {
        if let Err(err) = self.write_flag(CMD_BOOT_END) {
            warn!("Link[{}]: boot_end failed: {}", self.name(), err);
        }
        thread::sleep(Duration::from_millis(10));

        let version = self.read(CMD_GET_VER, MAX_PAYLOAD_LEN)?;
        if version.is_empty() {
            return Err(LinkError::Unsupported("empty model/version reply".to_string()));
        }
        let version = String::from_utf8_lossy(&version).into_owned();
        info!("Link[{}]: MICON: {}", self.name(), version);

        let power_state = self.read_u8(CMD_PWR_STATE)?;
        if matches!(
            power_state,
            PWR_STAT_COLD_BOOT | PWR_STAT_RUNNING | PWR_STAT_POWER_OFF
        ) {
            info!("Link[{}]: set serial mode to console", self.name());
            if let Err(err) = self.write_flag(CMD_SERMOD_CON) {
                warn!("Link[{}]: sermod_con failed: {}", self.name(), err);
            }
        }

        Ok(MiconInfo {
            version,
            power_state,
        })
    }
}
