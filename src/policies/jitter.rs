//! # Randomization of requeue delays.
//!
//! When many keys fail together (backend outage) they would otherwise come back
//! at the same instant. [`JitterPolicy`] spreads them out:
//!
//! - [`JitterPolicy::None`] — exact delay
//! - [`JitterPolicy::Full`] — random in `[0, delay]`
//! - [`JitterPolicy::Equal`] — `delay/2 + random[0, delay/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied on top of a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact delay. Predictable; used by default and in tests.
    #[default]
    None,
    /// Uniform in `[0, delay]`. Strongest spreading, may retry almost immediately.
    Full,
    /// Uniform in `[delay/2, delay]`. Keeps at least half of the backoff.
    Equal,
}

impl JitterPolicy {
    /// Applies the policy to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(ms - half + extra).min(delay)
            }
        }
    }
}
