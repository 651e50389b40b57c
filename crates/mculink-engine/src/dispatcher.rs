//! Event fan-out.
//!
//! Events are queued by the receive path and delivered on a dedicated worker
//! thread, so a slow or blocking subscriber never stalls the serial line.
//! Subscribers are called in descending priority order; subscribers with the
//! same priority are called in registration order. A subscriber returning
//! [`Flow::Stop`] consumes the event.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mculink_metrics::{metric_defs, metrics};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// How long dropping a dispatcher waits for its worker before detaching it.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Priority the LAN DISK and TeraStation key drivers register with.
pub const DEFAULT_PRIORITY: i32 = 128;

/// What to do with an event after a subscriber has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Pass the event on to lower-priority subscribers.
    Continue,
    /// The event is consumed.
    Stop,
}

/// Identifies a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Handler = Arc<dyn Fn(u8) -> Flow + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    priority: i32,
    handler: Handler,
}

/// The subscriber set, shared between the dispatcher and its worker.
#[derive(Default)]
struct Registry {
    /// Kept sorted by descending priority, stable for ties.
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Registry {
    fn subscribe(&self, priority: i32, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.lock();
        let pos = subscribers
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(subscribers.len());
        subscribers.insert(
            pos,
            Subscriber {
                id,
                priority,
                handler,
            },
        );
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|s| s.id == id) {
            Some(pos) => {
                subscribers.remove(pos);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, Handler)> {
        self.subscribers
            .lock()
            .iter()
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect()
    }

    fn len(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Queue and worker thread delivering events to subscribers.
///
/// Dropping the dispatcher closes the queue, lets the worker drain the events
/// already queued and joins it. A worker still busy after
/// [`SHUTDOWN_TIMEOUT`] (a subscriber that never returns) is detached and
/// finishes the queue on its own. When the drop happens on the worker itself
/// (a subscriber released the last handle to its link) the worker is left to
/// exit on its own.
pub struct EventDispatcher {
    registry: Arc<Registry>,
    queue: Option<Sender<u8>>,
    worker: Option<JoinHandle<()>>,
    /// Disconnects when the worker thread exits.
    stopped: Receiver<()>,
    link: String,
}

impl EventDispatcher {
    /// Start a dispatcher whose worker thread is called `thread_name`.
    pub fn spawn(thread_name: impl Into<String>, link: impl Into<String>) -> io::Result<Self> {
        let (queue, events) = crossbeam_channel::unbounded();
        let registry = Arc::new(Registry::default());
        let link = link.into();

        let (running, stopped) = crossbeam_channel::bounded::<()>(0);
        let worker_registry = Arc::clone(&registry);
        let worker_link = link.clone();
        let worker = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || {
                let _running = running;
                dispatch_loop(&worker_registry, &events, &worker_link);
            })?;

        Ok(EventDispatcher {
            registry,
            queue: Some(queue),
            worker: Some(worker),
            stopped,
            link,
        })
    }

    /// Queue an event for delivery. Never blocks.
    pub fn post(&self, code: u8) {
        let Some(queue) = &self.queue else {
            return;
        };
        if queue.send(code).is_err() {
            warn!("Dispatcher[{}]: worker gone, dropping event {:?}", self.link, char::from(code));
            return;
        }
        metrics::gauge!(metric_defs::EVENT_QUEUE_DEPTH.name, "link" => self.link.clone())
            .set(queue.len() as f64);
    }

    /// Register `handler` at `priority`.
    pub fn subscribe<F>(&self, priority: i32, handler: F) -> SubscriptionId
    where
        F: Fn(u8) -> Flow + Send + Sync + 'static,
    {
        let id = self.registry.subscribe(priority, Arc::new(handler));
        debug!("Dispatcher[{}]: subscriber {} at priority {}", self.link, id, priority);
        id
    }

    /// Register `handler` for as long as the returned guard lives.
    pub fn subscribe_scoped<F>(&self, priority: i32, handler: F) -> Subscription
    where
        F: Fn(u8) -> Flow + Send + Sync + 'static,
    {
        let id = self.subscribe(priority, handler);
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    ///
    /// An event already being delivered may still reach the subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of events waiting for the worker.
    pub fn queued(&self) -> usize {
        self.queue.as_ref().map_or(0, Sender::len)
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.queue.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if let Err(RecvTimeoutError::Timeout) = self.stopped.recv_timeout(SHUTDOWN_TIMEOUT) {
            warn!(
                "Dispatcher[{}]: subscriber still busy after {:?}, detaching worker",
                self.link, SHUTDOWN_TIMEOUT
            );
            return;
        }
        if worker.join().is_err() {
            warn!("Dispatcher[{}]: worker thread panicked", self.link);
        }
    }
}

fn dispatch_loop(registry: &Registry, events: &Receiver<u8>, link: &str) {
    while let Ok(code) = events.recv() {
        metrics::gauge!(metric_defs::EVENT_QUEUE_DEPTH.name, "link" => link.to_string())
            .set(events.len() as f64);

        let subscribers = registry.snapshot();
        trace!(
            "Dispatcher[{}]: event {:?} to {} subscribers",
            link,
            char::from(code),
            subscribers.len()
        );
        for (id, handler) in subscribers {
            metrics::counter!(metric_defs::EVENTS_DELIVERED.name, "link" => link.to_string())
                .increment(1);
            match panic::catch_unwind(AssertUnwindSafe(|| handler(code))) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    trace!("Dispatcher[{}]: event consumed by {}", link, id);
                    break;
                }
                Err(_) => warn!("Dispatcher[{}]: subscriber {} panicked", link, id),
            }
        }
    }
    debug!("Dispatcher[{}]: stopped", link);
}

/// Guard returned by [`EventDispatcher::subscribe_scoped`]. Unsubscribes on
/// drop.
#[must_use = "the subscriber is removed when the guard is dropped"]
pub struct Subscription {
    registry: Weak<Registry>,
    id: SubscriptionId,
}

impl Subscription {
    /// The id of the guarded subscriber.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
