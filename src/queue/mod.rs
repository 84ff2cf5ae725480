//! Work queues driving the reconciliation loops.
//!
//! - [`DeliveryQueue`] deduplicating key queue with checkout tracking
//! - [`RateLimitingQueue`] the same plus per-key exponential requeue delays
//! - [`Dispatcher`] worker loop applying the retry ceiling
//! - [`KeySerializingQueue`] latest-wins payload per key
//! - [`ObjectKey`] / [`KeyFormat`] keys understood by the dispatcher and how raw items parse

mod delivery;
mod dispatcher;
mod key;
mod keyed;
mod rate_limited;

pub use delivery::DeliveryQueue;
pub use dispatcher::{Dispatcher, Outcome};
pub use key::{KeyFormat, ObjectKey};
pub use keyed::KeySerializingQueue;
pub use rate_limited::RateLimitingQueue;
