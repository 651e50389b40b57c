//! Byte transport adapters.
//!
//! The link only needs something it can write frames to ([`ByteSink`]) and
//! someone calling [`LinkReceiver::receive`] with whatever the MCU sends.
//! Opening and configuring the UART is left to the caller; these adapters
//! connect an already open stream, or an in-memory channel for simulated
//! MCUs.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::link::LinkReceiver;

/// Outgoing half of a byte transport.
pub trait ByteSink: Send + Sync {
    /// Write one complete frame.
    fn send(&self, data: &[u8]) -> io::Result<()>;
}

impl<T: ByteSink + ?Sized> ByteSink for Arc<T> {
    fn send(&self, data: &[u8]) -> io::Result<()> {
        (**self).send(data)
    }
}

impl<T: ByteSink + ?Sized> ByteSink for Box<T> {
    fn send(&self, data: &[u8]) -> io::Result<()> {
        (**self).send(data)
    }
}

/// A [`ByteSink`] over any writer, e.g. an open serial device file.
#[derive(Debug)]
pub struct WriteSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriteSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        WriteSink {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> ByteSink for WriteSink<W> {
    fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()
    }
}

/// Thread reading a stream into a link.
///
/// The pump stops at end of stream, on a read error, or once the link it
/// feeds has been dropped. Read timeouts are retried.
#[derive(Debug)]
pub struct ReadPump {
    thread: JoinHandle<()>,
}

impl ReadPump {
    /// Size of a single read.
    pub const CHUNK: usize = 64;

    /// Start pumping `reader` into `receiver` on a thread named `name`.
    pub fn spawn<R, D>(name: impl Into<String>, reader: R, receiver: LinkReceiver<D>) -> io::Result<Self>
    where
        R: Read + Send + 'static,
        D: Dialect,
    {
        let name = name.into();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || pump(&name, reader, &receiver))?;
        Ok(ReadPump { thread })
    }

    /// Check if the pump has stopped.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the pump to stop.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

fn pump<R: Read, D: Dialect>(name: &str, mut reader: R, receiver: &LinkReceiver<D>) {
    let mut buf = [0u8; ReadPump::CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("{}: end of stream", name);
                break;
            }
            Ok(n) => {
                if receiver.receive(&buf[..n]).is_err() {
                    debug!("{}: link dropped", name);
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                if !receiver.is_attached() {
                    break;
                }
            }
            Err(e) => {
                warn!("{}: read failed: {}", name, e);
                break;
            }
        }
    }
}

/// In-memory transport: the host side is a [`ByteSink`], the device side
/// sees every frame the host writes.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a connected host/device pair.
    pub fn pair() -> (ChannelTransport, DeviceEnd) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelTransport { tx }, DeviceEnd { rx })
    }
}

impl ByteSink for ChannelTransport {
    fn send(&self, data: &[u8]) -> io::Result<()> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "device end closed"))
    }
}

/// Device side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct DeviceEnd {
    rx: Receiver<Vec<u8>>,
}

impl DeviceEnd {
    /// Wait for the next frame. `None` once the host side is gone.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    /// Wait up to `timeout` for the next frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Frames written but not yet received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
