//! # RateLimitingQueue: delivery queue plus per-key failure history.
//!
//! ```text
//! add_rate_limited(k) ──► limiter.when(k) = d ──► queue.add_after(k, d)
//! num_requeues(k)     ──► limiter.num_requeues(k)
//! forget(k)           ──► limiter.forget(k)      (queue membership untouched)
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::events::Bus;
use crate::policies::{BackoffPolicy, RateLimiter};
use crate::queue::DeliveryQueue;

/// [`DeliveryQueue`] with exponential per-key requeue delays. Cheap to clone.
pub struct RateLimitingQueue<K> {
    queue: DeliveryQueue<K>,
    limiter: Arc<RateLimiter<K>>,
}

impl<K> Clone for RateLimitingQueue<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<K> RateLimitingQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates an unobserved queue using `backoff` for requeue delays.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            queue: DeliveryQueue::new(),
            limiter: Arc::new(RateLimiter::new(backoff)),
        }
    }

    /// Creates a queue that reports on `bus` under `name`.
    pub fn named(name: &str, backoff: BackoffPolicy, bus: Option<Bus>) -> Self {
        Self {
            queue: DeliveryQueue::named(name, bus),
            limiter: Arc::new(RateLimiter::new(backoff)),
        }
    }

    /// Records a failure for `key` and re-adds it after the resulting backoff delay.
    ///
    /// Returns the delay that was scheduled.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.limiter.when(&key);
        self.queue.add_after(key, delay);
        delay
    }

    /// Clears the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// Requeues recorded for `key` since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// See [`DeliveryQueue::add`].
    pub fn add(&self, key: K) -> bool {
        self.queue.add(key)
    }

    /// See [`DeliveryQueue::add_after`].
    pub fn add_after(&self, key: K, delay: Duration) {
        self.queue.add_after(key, delay);
    }

    /// See [`DeliveryQueue::get`].
    pub async fn get(&self) -> Option<K> {
        self.queue.get().await
    }

    /// See [`DeliveryQueue::done`].
    pub fn done(&self, key: &K) {
        self.queue.done(key);
    }

    /// See [`DeliveryQueue::shut_down`].
    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    /// Underlying delivery queue.
    pub fn delivery(&self) -> &DeliveryQueue<K> {
        &self.queue
    }
}
