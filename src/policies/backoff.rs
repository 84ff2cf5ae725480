//! # Per-attempt requeue delay.
//!
//! [`BackoffPolicy`] maps the number of failures a key has accumulated to the
//! delay before it is handed back to a worker:
//!
//! ```text
//! delay(n) = min(first × factor^n, max)  → jitter applied on top
//! ```
//!
//! The base delay is derived from the failure count alone, so jitter output never
//! feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(5),
//!     max: Duration::from_secs(1000),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(0), Duration::from_millis(5));
//! assert_eq!(backoff.delay_for(3), Duration::from_millis(40));
//! assert_eq!(backoff.delay_for(40), Duration::from_secs(1000));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential requeue delay, capped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per failure (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the capped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Per-item exponential curve used by reconciliation controllers:
    /// - `first = 5ms`;
    /// - `factor = 2.0`;
    /// - `max = 1000s`;
    /// - no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay of `every`, useful for tests and tight loops.
    pub fn constant(every: Duration) -> Self {
        Self {
            first: every,
            max: every,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay for a key that has already failed `failures` times.
    ///
    /// Non-finite or negative intermediate values (huge exponents, odd factors)
    /// collapse to [`BackoffPolicy::max`].
    pub fn delay_for(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
