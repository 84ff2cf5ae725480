//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `DeliveryQueue` (shutdown), `Dispatcher` workers,
//!   `NodeProbeController` cycles.
//! - **Consumers**: [`SubscriberSet::listen`](crate::SubscriberSet::listen),
//!   or any caller of [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub(crate) use bus::Emitter;
pub use event::{Event, EventKind};
