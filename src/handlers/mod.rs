//! Reconciliation handlers invoked by [`Dispatcher`](crate::Dispatcher) workers.
//!
//! - [`Handler`] trait (async, cancelable)
//! - [`HandlerFn`] closure-backed implementation
//! - [`HandlerRef`] shared `Arc<dyn Handler>`

mod handler;
mod handler_fn;

pub use handler::{Handler, HandlerRef};
pub use handler_fn::HandlerFn;
