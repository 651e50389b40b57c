//! Simulated MCUs for integration tests.
//!
//! A simulated MCU runs on its own thread, reads every frame the host writes
//! through a [`ChannelTransport`] and answers through the link's receiver,
//! the same way a UART driver would.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mculink_engine::binary_protocol::{checksum, Op};
use mculink_engine::{ChannelTransport, DeviceEnd, Dialect, Link, LinkConfig, LinkReceiver};
use parking_lot::Mutex;

/// Install a test log writer once. Honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a binary frame as the MICON sends it.
pub fn micon_frame(op: Op, cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![op.bits() | payload.len() as u8, cmd];
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    buf
}

/// A running simulated MCU.
pub struct SimMcu {
    thread: Option<JoinHandle<()>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    overlaps: Arc<AtomicUsize>,
}

impl SimMcu {
    /// Start answering frames from `device`.
    ///
    /// `respond` gets each host frame and returns the chunks to deliver, in
    /// order. Returning no chunks leaves the request unanswered.
    pub fn spawn<D, F>(device: DeviceEnd, receiver: LinkReceiver<D>, mut respond: F) -> Self
    where
        D: Dialect,
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let log = Arc::clone(&requests);
        let overlap_count = Arc::clone(&overlaps);
        let thread = thread::Builder::new()
            .name("sim-mcu".to_string())
            .spawn(move || {
                while let Some(frame) = device.recv() {
                    log.lock().push(frame.clone());
                    // Give a misbehaving host the chance to write a second
                    // request before this one is answered.
                    thread::sleep(Duration::from_micros(300));
                    if device.pending() > 0 {
                        overlap_count.fetch_add(1, Ordering::SeqCst);
                    }
                    for chunk in respond(&frame) {
                        if receiver.receive(&chunk).is_err() {
                            return;
                        }
                    }
                }
            })
            .expect("spawn simulated MCU");

        SimMcu {
            thread: Some(thread),
            requests,
            overlaps,
        }
    }

    /// Frames received so far.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().clone()
    }

    /// Times a request arrived while another one was still unanswered.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

impl Drop for SimMcu {
    fn drop(&mut self) {
        // The thread ends once the link, and with it the host sink, is gone.
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}

/// Open a link of dialect `D` served by a simulated MCU.
pub fn open_with_mcu<D, F>(config: LinkConfig, respond: F) -> (Link<D>, SimMcu)
where
    D: Dialect,
    F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
{
    init_tracing();
    let (host, device) = ChannelTransport::pair();
    let link = Link::<D>::open(host, config).expect("open link");
    let mcu = SimMcu::spawn(device, link.receiver(), respond);
    (link, mcu)
}

/// Collects event codes delivered to a subscriber.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<u8>>>,
}

impl EventLog {
    pub fn push(&self, code: u8) {
        self.events.lock().push(code);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.events.lock().clone()
    }

    /// Wait until `count` events have been recorded.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<u8> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let events = self.snapshot();
            if events.len() >= count || std::time::Instant::now() >= deadline {
                return events;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}
