//! The transaction engine.
//!
//! A [`Link`] owns one serial channel to one MCU. Callers on any thread use
//! [`Link::execute`]; the link lets one request at a time onto the wire and
//! blocks the caller until the reply arrives or the timeout expires. Bytes
//! from the MCU come in through a [`LinkReceiver`] and either complete the
//! outstanding transaction or are queued as events.
//!
//! Two locks are involved. The execution lock is held by a caller for the
//! whole exchange. The receive lock guards the decoder and the outstanding
//! transaction and is only ever held briefly, so the receive path never waits
//! for a caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use mculink_metrics::{metric_defs, metrics, LinkLabels};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::LinkConfig;
use crate::dialect::{Dialect, Received};
use crate::dispatcher::{EventDispatcher, Flow, Subscription, SubscriptionId};
use crate::error::{LinkError, LinkResult};
use crate::transaction::Transaction;
use crate::transport::ByteSink;

/// Counters of one link, as returned by [`Link::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Transactions started.
    pub transactions: u64,
    /// Transactions that failed, including timeouts.
    pub failures: u64,
    /// Transactions that timed out.
    pub timeouts: u64,
    /// Replies received with no transaction outstanding.
    pub discarded_replies: u64,
    /// Inbound frames or lines rejected by the decoder.
    pub malformed: u64,
    /// Events queued for dispatch.
    pub events: u64,
}

#[derive(Default)]
struct Counters {
    transactions: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    discarded_replies: AtomicU64,
    malformed: AtomicU64,
    events: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LinkStats {
        LinkStats {
            transactions: self.transactions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            discarded_replies: self.discarded_replies.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Decoder and outstanding transaction.
struct RxState<D: Dialect> {
    decoder: D::Decoder,
    pending: Option<Transaction<D>>,
}

struct Shared<D: Dialect> {
    name: String,
    timeout: Duration,
    sink: Box<dyn ByteSink>,
    /// Held by a caller for the whole exchange.
    exec_lock: Mutex<()>,
    rx: Mutex<RxState<D>>,
    next_seq: AtomicU64,
    dispatcher: EventDispatcher,
    counters: Counters,
    link_labels: LinkLabels,
    labels: Vec<(&'static str, String)>,
}

impl<D: Dialect> Shared<D> {
    /// Handle bytes from the MCU.
    fn receive(&self, data: &[u8]) {
        metrics::counter!(metric_defs::RX_BYTES.name, &self.labels).increment(data.len() as u64);
        trace!("Link[{}]: rx {}", self.name, hex::encode(data));

        let mut items = Vec::new();
        let mut events = Vec::new();
        {
            let mut rx = self.rx.lock();
            D::decode(&mut rx.decoder, data, &mut items);
            for item in items {
                match item {
                    Received::Reply(frame) => match rx.pending.take() {
                        Some(txn) => {
                            trace!(
                                "Link[{}]: reply to #{} after {:?}",
                                self.name,
                                txn.seq,
                                txn.started.elapsed()
                            );
                            let result = D::complete(&txn.request, frame, txn.reply_len);
                            txn.complete(result);
                        }
                        None => {
                            debug!("Link[{}]: no transaction waiting, discarding {:?}", self.name, frame);
                            bump(&self.counters.discarded_replies);
                            metrics::counter!(metric_defs::RX_DISCARDED.name, &self.labels).increment(1);
                        }
                    },
                    Received::Malformed(err) => {
                        bump(&self.counters.malformed);
                        metrics::counter!(metric_defs::RX_MALFORMED.name, &self.labels).increment(1);
                        match rx.pending.take() {
                            Some(txn) => {
                                debug!("Link[{}]: #{} failed: {}", self.name, txn.seq, err);
                                txn.complete(Err(err));
                            }
                            None => debug!("Link[{}]: dropped malformed input: {}", self.name, err),
                        }
                    }
                    Received::Event(code) => events.push(code),
                }
            }
        }

        for code in events {
            self.post_event(code);
        }
    }

    fn post_event(&self, code: u8) {
        trace!("Link[{}]: event {:?}", self.name, char::from(code));
        bump(&self.counters.events);
        metrics::counter!(metric_defs::EVENTS_RECEIVED.name, &self.labels).increment(1);
        self.dispatcher.post(code);
    }

    /// Drop transaction `seq` if it is still outstanding.
    fn abandon(&self, seq: u64) -> bool {
        let mut rx = self.rx.lock();
        match &rx.pending {
            Some(txn) if txn.seq == seq => {
                rx.pending = None;
                true
            }
            _ => false,
        }
    }

    fn record<T>(&self, result: &LinkResult<T>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => {
                metrics::histogram!(metric_defs::TRANSACTION_LATENCY.name, &self.labels)
                    .record(elapsed.as_micros() as f64);
                "ok"
            }
            Err(err) => {
                bump(&self.counters.failures);
                if matches!(err, LinkError::Timeout(_)) {
                    bump(&self.counters.timeouts);
                }
                err.outcome()
            }
        };
        let labels = self.link_labels.with_outcome(outcome);
        metrics::counter!(metric_defs::TRANSACTIONS.name, &labels).increment(1);
    }
}

/// Handle to an MCU link. Clones share the same link.
///
/// Dropping the last handle stops the event dispatcher. A subscriber that is
/// still running after [`SHUTDOWN_TIMEOUT`](crate::dispatcher::SHUTDOWN_TIMEOUT)
/// is left to finish on its detached worker thread.
pub struct Link<D: Dialect> {
    shared: Arc<Shared<D>>,
}

impl<D: Dialect> Clone for Link<D> {
    fn clone(&self) -> Self {
        Link {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Dialect> std::fmt::Debug for Link<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.shared.name)
            .field("dialect", &D::NAME)
            .field("timeout", &self.shared.timeout)
            .finish()
    }
}

impl<D: Dialect> Link<D> {
    /// Open a link writing to `sink`.
    ///
    /// Nothing is read until the transport is connected to
    /// [`receiver`](Self::receiver).
    pub fn open(sink: impl ByteSink + 'static, config: LinkConfig) -> LinkResult<Self> {
        config.validate()?;
        let dispatcher = EventDispatcher::spawn(config.dispatcher_thread_name(), config.name.clone())?;
        let link_labels = LinkLabels::new(config.name.clone(), D::NAME);
        let timeout = config.timeout_or(D::DEFAULT_TIMEOUT);
        debug!("Link[{}]: open ({} dialect, timeout {:?})", config.name, D::NAME, timeout);

        let shared = Shared {
            timeout,
            sink: Box::new(sink),
            exec_lock: Mutex::new(()),
            rx: Mutex::new(RxState {
                decoder: D::decoder(&config),
                pending: None,
            }),
            next_seq: AtomicU64::new(1),
            dispatcher,
            counters: Counters::default(),
            labels: link_labels.to_labels(),
            link_labels,
            name: config.name,
        };
        Ok(Link {
            shared: Arc::new(shared),
        })
    }

    /// The link name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The reply timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Send `request` and wait for its reply, returning at most `reply_len`
    /// units of reply payload.
    ///
    /// Concurrent callers are served one at a time. Invalid requests fail
    /// before anything is sent. The engine never retries.
    pub fn execute(&self, request: D::Request, reply_len: usize) -> LinkResult<D::Reply> {
        let frame = D::encode(&request)?;

        let _guard = self.shared.exec_lock.lock();
        let started = Instant::now();
        let result = self.transact(request, &frame, reply_len);
        self.shared.record(&result, started.elapsed());
        result
    }

    fn transact(&self, request: D::Request, frame: &[u8], reply_len: usize) -> LinkResult<D::Reply> {
        let shared = &*self.shared;
        let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
        bump(&shared.counters.transactions);
        debug!("Link[{}]: #{} {:?}", shared.name, seq, request);

        let wait = D::expects_reply(&request, reply_len);
        let completion = {
            let mut rx = shared.rx.lock();
            D::reset(&mut rx.decoder);
            if wait {
                let (txn, completion) = Transaction::new(seq, request, reply_len);
                rx.pending = Some(txn);
                Some(completion)
            } else {
                rx.pending = None;
                None
            }
        };

        trace!("Link[{}]: tx {}", shared.name, hex::encode(frame));
        if let Err(err) = shared.sink.send(frame) {
            warn!("Link[{}]: #{} send failed: {}", shared.name, seq, err);
            shared.abandon(seq);
            return Err(err.into());
        }

        let Some(completion) = completion else {
            metrics::counter!(metric_defs::FIRE_AND_FORGET.name, &shared.labels).increment(1);
            return Ok(D::empty_reply());
        };

        match completion.recv_timeout(shared.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if !shared.abandon(seq) && completion.try_recv().is_ok() {
                    // Completed between the timeout and the abandon.
                    bump(&shared.counters.discarded_replies);
                }
                warn!("Link[{}]: #{} command timeout", shared.name, seq);
                Err(LinkError::Timeout(shared.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Detached),
        }
    }

    /// The receive entry point to hand to the byte transport.
    pub fn receiver(&self) -> LinkReceiver<D> {
        LinkReceiver {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Feed bytes received from the MCU.
    pub fn receive(&self, data: &[u8]) {
        self.shared.receive(data);
    }

    /// Inject an event signalled outside the serial stream, such as the
    /// MICON interrupt line.
    pub fn notify_event(&self, code: u8) {
        self.shared.post_event(code);
    }

    /// Register an event handler. Higher priorities are called first.
    pub fn subscribe<F>(&self, priority: i32, handler: F) -> SubscriptionId
    where
        F: Fn(u8) -> Flow + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(priority, handler)
    }

    /// Register an event handler for as long as the returned guard lives.
    pub fn subscribe_scoped<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(u8) -> Flow + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe_scoped(priority, handler)
    }

    /// Remove an event handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.dispatcher.unsubscribe(id)
    }

    /// A handle that does not keep the link alive.
    ///
    /// Event handlers that call back into the link should capture one of
    /// these; a strong handle inside a handler keeps the link open forever.
    pub fn downgrade(&self) -> WeakLink<D> {
        WeakLink {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> LinkStats {
        self.shared.counters.snapshot()
    }

    /// Events waiting for the dispatcher thread.
    pub fn queued_events(&self) -> usize {
        self.shared.dispatcher.queued()
    }
}

/// Receive entry point of a link. Does not keep the link alive.
pub struct LinkReceiver<D: Dialect> {
    shared: Weak<Shared<D>>,
}

impl<D: Dialect> Clone for LinkReceiver<D> {
    fn clone(&self) -> Self {
        LinkReceiver {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<D: Dialect> LinkReceiver<D> {
    /// Feed bytes received from the MCU. Fails with [`LinkError::Detached`]
    /// once the link is gone.
    pub fn receive(&self, data: &[u8]) -> LinkResult<()> {
        let shared = self.shared.upgrade().ok_or(LinkError::Detached)?;
        shared.receive(data);
        Ok(())
    }

    /// Check if the link is still open.
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

/// Non-owning link handle, see [`Link::downgrade`].
pub struct WeakLink<D: Dialect> {
    shared: Weak<Shared<D>>,
}

impl<D: Dialect> Clone for WeakLink<D> {
    fn clone(&self) -> Self {
        WeakLink {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<D: Dialect> WeakLink<D> {
    /// The link, if it is still open.
    pub fn upgrade(&self) -> Option<Link<D>> {
        self.shared.upgrade().map(|shared| Link { shared })
    }
}
