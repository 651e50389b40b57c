//! Metric declarations for MCU links.
//!
//! Every metric the link engine emits is declared here as a [`Metric`]
//! constant so names stay consistent between emitters and dashboards. The
//! `metrics` crate is re-exported; install any recorder before opening links
//! and call [`describe_metrics`] once.
//!
//! # Example
//!
//! ```rust
//! use mculink_metrics::{metric_defs, metrics, LinkLabels};
//!
//! let labels = LinkLabels::new("micon", "binary");
//! metrics::counter!(metric_defs::TRANSACTIONS.name, &labels.with_outcome("ok")).increment(1);
//! ```

pub use metrics;

use metrics::{KeyName, Recorder, SharedString, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic count, e.g. completed transactions.
    Counter,
    /// Value that moves both ways, e.g. queue depth.
    Gauge,
    /// Distribution of samples, e.g. reply latency.
    Histogram,
}

/// A metric name together with what a recorder needs to describe it.
///
/// ```rust
/// use mculink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("mculink.retries")
///     .with_description("Retried transactions")
///     .with_unit(Unit::Count)
///     .with_labels(&["link"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Dotted name, always starting with `mculink.`.
    pub name: &'static str,
    /// Which `metrics` macro emits it.
    pub kind: MetricKind,
    /// Human-readable help text handed to the recorder.
    pub description: &'static str,
    /// Unit of the recorded values, if any.
    pub unit: Option<Unit>,
    /// Label keys every emission carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn declare(kind: MetricKind, name: &'static str) -> Self {
        Metric {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter named `name`.
    pub const fn counter(name: &'static str) -> Self {
        Self::declare(MetricKind::Counter, name)
    }

    /// Declare a gauge named `name`.
    pub const fn gauge(name: &'static str) -> Self {
        Self::declare(MetricKind::Gauge, name)
    }

    /// Declare a histogram named `name`.
    pub const fn histogram(name: &'static str) -> Self {
        Self::declare(MetricKind::Histogram, name)
    }

    /// Set the help text.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit of the recorded values.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the label keys every emission carries.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Hand the description and unit to the installed recorder. Without a
    /// recorder this does nothing.
    pub fn describe(&self) {
        let key = KeyName::from_const_str(self.name);
        let description = SharedString::const_str(self.description);
        metrics::with_recorder(|recorder| match self.kind {
            MetricKind::Counter => recorder.describe_counter(key, self.unit, description),
            MetricKind::Gauge => recorder.describe_gauge(key, self.unit, description),
            MetricKind::Histogram => recorder.describe_histogram(key, self.unit, description),
        });
    }
}

/// All metrics emitted by the link engine.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every link-scoped metric.
    pub const LINK_LABELS: &[&str] = &["link", "dialect"];

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Completed transactions.
    ///
    /// Labels: link, dialect, outcome
    ///
    /// `outcome` is `ok`, `timeout`, `correlation`, `device`, `framing`,
    /// `transport` or `detached`.
    pub const TRANSACTIONS: Metric = Metric::counter("mculink.transactions")
        .with_description("Completed transactions by outcome")
        .with_unit(Unit::Count)
        .with_labels(&["link", "dialect", "outcome"]);

    /// Time from request write to reply in microseconds.
    pub const TRANSACTION_LATENCY: Metric = Metric::histogram("mculink.transaction.latency_us")
        .with_description("Time from request write to reply in microseconds")
        .with_unit(Unit::Microseconds)
        .with_labels(LINK_LABELS);

    /// Requests written without waiting for a reply.
    pub const FIRE_AND_FORGET: Metric = Metric::counter("mculink.transaction.fire_and_forget")
        .with_description("Requests written without waiting for a reply")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Receive path
    // ========================================================================

    /// Bytes handed to the receive path.
    pub const RX_BYTES: Metric = Metric::counter("mculink.rx.bytes")
        .with_description("Bytes received from the MCU")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    /// Inbound data rejected by the decoder.
    pub const RX_MALFORMED: Metric = Metric::counter("mculink.rx.malformed")
        .with_description("Inbound frames or lines rejected by the decoder")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Replies that arrived with no transaction waiting.
    pub const RX_DISCARDED: Metric = Metric::counter("mculink.rx.discarded_replies")
        .with_description("Replies received with no transaction outstanding")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Events
    // ========================================================================

    /// Events queued for dispatch.
    pub const EVENTS_RECEIVED: Metric = Metric::counter("mculink.events.received")
        .with_description("Events queued for dispatch")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Handler invocations made by the dispatcher.
    pub const EVENTS_DELIVERED: Metric = Metric::counter("mculink.events.delivered")
        .with_description("Event handler invocations")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Events waiting in the dispatcher queue.
    pub const EVENT_QUEUE_DEPTH: Metric = Metric::gauge("mculink.events.queue_depth")
        .with_description("Events waiting for the dispatcher thread")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &TRANSACTIONS,
        &TRANSACTION_LATENCY,
        &FIRE_AND_FORGET,
        &RX_BYTES,
        &RX_MALFORMED,
        &RX_DISCARDED,
        &EVENTS_RECEIVED,
        &EVENTS_DELIVERED,
        &EVENT_QUEUE_DEPTH,
    ];
}

/// Labels identifying one link.
///
/// ```rust
/// use mculink_metrics::LinkLabels;
///
/// let labels = LinkLabels::new("r8c", "text");
/// let timeout = labels.with_outcome("timeout");
/// assert_eq!(timeout[2], ("outcome", "timeout".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLabels {
    /// Link name from the configuration.
    pub link: String,
    /// Wire dialect (`binary` or `text`).
    pub dialect: String,
}

impl LinkLabels {
    /// Labels for link `link` speaking `dialect`.
    pub fn new(link: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            dialect: dialect.into(),
        }
    }

    /// Label pairs in the form the `metrics` macros take.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("link", self.link.clone()), ("dialect", self.dialect.clone())]
    }

    /// The link labels plus the transaction `outcome`.
    pub fn with_outcome(&self, outcome: &str) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.push(("outcome", outcome.to_string()));
        labels
    }
}

/// Registers the descriptions of all metrics with the installed recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
