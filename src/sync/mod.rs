//! Synchronization primitives used by the control loops.
//!
//! - [`BroadcastCell`] single-slot versioned value; readers wait for the next publish.
//! - [`SingleFlight`] collapses concurrent calls sharing a dedup key into one execution.

mod broadcast;
mod single_flight;

pub use broadcast::{BroadcastCell, Subscription, Versioned};
pub use single_flight::{Flight, SingleFlight};
