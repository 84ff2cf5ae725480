//! Retry policies.
//!
//! This module groups the knobs that control **how long** a failed key waits
//! before it is delivered again.
//!
//! ## Contents
//! - [`BackoffPolicy`] how requeue delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization to avoid synchronized retries
//! - [`RateLimiter`]   per-key failure counter feeding the backoff curve
//!
//! ## Quick wiring
//! ```text
//! RetryConfig { max_retries, backoff }
//!      └─► queue::Dispatcher uses:
//!           - RateLimiter::num_requeues(key) against max_retries
//!           - RateLimiter::when(key) to schedule add_after(key, delay)
//!           - RateLimiter::forget(key) on success / abandonment
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=5ms, factor=2.0, max=1000s, jitter=None.
//! - `JitterPolicy::None`; consider `Equal` when many keys fail together.

mod backoff;
mod jitter;
mod rate_limiter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use rate_limiter::RateLimiter;
