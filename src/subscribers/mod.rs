//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Dispatcher / NodeProbeController ── publish(Event) ──► Bus
//!                                                         │
//!                                          SubscriberSet::listen()
//!                                                         │
//!                                    ┌────────────────────┼──────────────┐
//!                                    ▼                    ▼              ▼
//!                                LogWriter             Metrics         Custom
//!                               (tracing)
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
