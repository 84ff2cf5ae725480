//! Node health probing.
//!
//! - [`NodeProbeController`] periodic, deduplicated, timeout-bounded probe loop
//! - [`Prober`] / [`ProbeFn`] backend probe abstraction
//! - [`ProbeResult`] outcome shared through a [`BroadcastCell`](crate::BroadcastCell)

mod controller;
mod prober;
mod result;

pub use controller::NodeProbeController;
pub use prober::{ProbeFn, Prober, ProberRef};
pub use result::ProbeResult;
