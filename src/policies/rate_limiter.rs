//! # Per-key failure tracking.
//!
//! [`RateLimiter`] remembers how many consecutive times each key has been
//! requeued and turns that count into a delay through a [`BackoffPolicy`].
//!
//! ```text
//! when(k)          → delay_for(failures[k]); failures[k] += 1
//! num_requeues(k)  → failures[k]
//! forget(k)        → failures[k] = 0   (success or abandonment)
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Thread-safe per-key exponential failure limiter.
#[derive(Debug)]
pub struct RateLimiter<K> {
    backoff: BackoffPolicy,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Creates a limiter that computes delays with `backoff`.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records one more failure for `key` and returns how long to wait before retrying it.
    pub fn when(&self, key: &K) -> Duration {
        let mut failures = self.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Number of times `key` has been requeued since it was last forgotten.
    pub fn num_requeues<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Clears the failure history of `key`.
    pub fn forget<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, u32>> {
        // The map holds plain counters; a panic elsewhere cannot leave it half-updated.
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
