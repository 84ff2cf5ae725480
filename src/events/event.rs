//! # Runtime events emitted by queues, dispatchers and the probe controller.
//!
//! The [`EventKind`] enum classifies events across three groups:
//! - **Work events**: what happened to a key (processed, requeued, abandoned, invalid)
//! - **Probe events**: outcome of each node probe cycle
//! - **Subscriber events**: delivery problems inside the observer fan-out
//!
//! The [`Event`] struct carries optional metadata (component, key, attempt,
//! delay, timeout, reason) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ItemRequeued)
//!     .with_source("pod-status")
//!     .with_key("default/web")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_millis(40))
//!     .with_reason("backend busy");
//!
//! assert_eq!(ev.kind, EventKind::ItemRequeued);
//! assert_eq!(ev.key.as_deref(), Some("default/web"));
//! assert_eq!(ev.delay_ms, Some(40));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Work events ===
    /// Handler finished a key successfully; its failure history was cleared.
    ///
    /// Sets: `source`, `key`, `attempt` (1-based attempt that succeeded).
    ItemProcessed,

    /// Handler failed; the key was scheduled again after a backoff delay.
    ///
    /// Sets: `source`, `key`, `attempt`, `delay_ms`, `reason`.
    ItemRequeued,

    /// Retry ceiling reached; the key was forgotten until re-added.
    ///
    /// Sets: `source`, `key`, `attempt`, `reason` (wrapped handler error).
    ItemAbandoned,

    /// Handler observed cancellation; the key was dropped without retry.
    ///
    /// Sets: `source`, `key`.
    ItemCanceled,

    /// An item taken from the queue was not a well-formed key and was dropped.
    ///
    /// Sets: `source`, `key` (raw item), `reason`.
    ItemInvalid,

    /// A queue stopped accepting keys.
    ///
    /// Sets: `source`.
    QueueShutDown,

    // === Probe events ===
    /// The backend answered the probe without error.
    ///
    /// Sets: `source`.
    ProbeSucceeded,

    /// The backend answered the probe with an error.
    ///
    /// Sets: `source`, `reason`.
    ProbeFailed,

    /// The probe cycle gave up waiting after its timeout.
    ///
    /// Sets: `source`, `timeout_ms`.
    ProbeTimedOut,

    /// The probe cycle was cancelled before the backend answered.
    ///
    /// Sets: `source`.
    ProbeCanceled,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `source` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `source` (subscriber name), `reason`.
    SubscriberPanicked,
}

impl EventKind {
    /// Short stable label (kebab-case) used as the log prefix.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::ItemProcessed => "item-processed",
            EventKind::ItemRequeued => "item-requeued",
            EventKind::ItemAbandoned => "item-abandoned",
            EventKind::ItemCanceled => "item-canceled",
            EventKind::ItemInvalid => "item-invalid",
            EventKind::QueueShutDown => "queue-shut-down",
            EventKind::ProbeSucceeded => "probe-succeeded",
            EventKind::ProbeFailed => "probe-failed",
            EventKind::ProbeTimedOut => "probe-timed-out",
            EventKind::ProbeCanceled => "probe-canceled",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::SubscriberPanicked => "subscriber-panicked",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Component that emitted the event (queue or controller name).
    pub source: Option<Arc<str>>,
    /// Work key, if applicable.
    pub key: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Requeue delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Probe timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            key: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            reason: None,
        }
    }

    /// Attaches the emitting component's name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a work key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a requeue delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a probe timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    /// True for events produced by the subscriber fan-out itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
