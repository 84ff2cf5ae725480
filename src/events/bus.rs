//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] used by queues,
//! dispatcher workers and the probe controller to report what they did.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Listener (one per SubscriberSet):
//!   Dispatcher worker 1 ──┐
//!   Dispatcher worker N ──┼──► Bus ───► SubscriberSet::listen ───► Subscribe impls
//!   NodeProbeController ──┤ (broadcast)
//!   DeliveryQueue       ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Optional bus handle carried by components that may run unobserved.
#[derive(Clone, Debug, Default)]
pub(crate) struct Emitter {
    bus: Option<Bus>,
    source: Option<std::sync::Arc<str>>,
}

impl Emitter {
    pub(crate) fn new(bus: Option<Bus>, source: impl Into<std::sync::Arc<str>>) -> Self {
        Self {
            bus,
            source: Some(source.into()),
        }
    }

    /// Stamps the component name and publishes, if a bus is attached.
    pub(crate) fn emit(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            let ev = match &self.source {
                Some(src) => ev.with_source(src.clone()),
                None => ev,
            };
            bus.publish(ev);
        }
    }
}
