//! # DeliveryQueue: deduplicating key queue with checkout tracking.
//!
//! Keys wait in FIFO order; a key is never queued twice and is never handed to
//! two workers at once.
//!
//! ```text
//!            add(k)                         get()                      done(k)
//!  k ∈ queue      → no-op          queue ──pop──► processing     processing ──► removed
//!  k ∈ processing → dirty                                         k ∈ dirty ──► queue (wake one getter)
//!  otherwise      → queue (wake one getter)
//! ```
//!
//! ## Rules
//! - A key is in at most one of {queue, processing}.
//! - `add` during checkout marks the key dirty; it is requeued exactly when `done` is called.
//! - After `shut_down`, `add` is a no-op but the backlog (including keys already
//!   dirty) is still delivered; `get` returns `None` once nothing is left.
//! - Dropping a pending `get()` future never loses a key or a wake-up.
//! - Delayed inserts (`add_after`) still waiting at shutdown are discarded.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Emitter, Event, EventKind};

struct State<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    /// Wakes getters when a key becomes available or on shutdown.
    ready: Notify,
    /// Wakes `shut_down_with_drain` when processing empties.
    idle: Notify,
    /// Cancels pending delayed inserts.
    timers: CancellationToken,
    emitter: Emitter,
}

/// Deduplicating delivery queue. Cheap to clone; clones share the same queue.
pub struct DeliveryQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for DeliveryQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for DeliveryQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DeliveryQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates an anonymous, unobserved queue.
    pub fn new() -> Self {
        Self::with_emitter(Emitter::default())
    }

    /// Creates a queue that reports its shutdown on `bus` under `name`.
    pub fn named(name: &str, bus: Option<Bus>) -> Self {
        Self::with_emitter(Emitter::new(bus, name))
    }

    fn with_emitter(emitter: Emitter) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    queued: HashSet::new(),
                    processing: HashSet::new(),
                    dirty: HashSet::new(),
                    shutting_down: false,
                }),
                ready: Notify::new(),
                idle: Notify::new(),
                timers: CancellationToken::new(),
                emitter,
            }),
        }
    }

    /// Marks `key` as needing processing.
    ///
    /// Returns `false` if the key was ignored because the queue is shutting down.
    pub fn add(&self, key: K) -> bool {
        let mut st = self.lock();
        if st.shutting_down {
            return false;
        }
        if st.processing.contains(&key) {
            st.dirty.insert(key);
            return true;
        }
        if st.queued.insert(key.clone()) {
            st.queue.push_back(key);
            drop(st);
            self.inner.ready.notify_one();
        }
        true
    }

    /// Adds `key` once `delay` has elapsed. Must be called inside a tokio runtime.
    ///
    /// A zero delay adds immediately. Nothing is scheduled after shutdown.
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        let timers = self.inner.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timers.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    queue.add(key);
                }
            }
        });
    }

    /// Waits for the next key and checks it out.
    ///
    /// Returns `None` once the queue is shut down and its backlog is empty.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.lock();
                if let Some(key) = st.queue.pop_front() {
                    st.queued.remove(&key);
                    st.processing.insert(key.clone());
                    let more = !st.queue.is_empty();
                    drop(st);
                    if more {
                        // Coalesced wake-ups: hand the baton to another getter.
                        self.inner.ready.notify_one();
                    }
                    return Some(key);
                }
                if st.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Ends the checkout of `key`; a dirty key goes back to the queue.
    pub fn done(&self, key: &K) {
        let mut st = self.lock();
        st.processing.remove(key);
        let requeue = st.dirty.remove(key);
        if requeue && st.queued.insert(key.clone()) {
            st.queue.push_back(key.clone());
        }
        let idle = st.processing.is_empty();
        drop(st);

        if requeue {
            self.inner.ready.notify_one();
        }
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    /// Drops a pending redelivery of a checked-out `key`. Returns whether one was pending.
    pub(crate) fn clear_dirty(&self, key: &K) -> bool {
        self.lock().dirty.remove(key)
    }

    /// Stops accepting keys and wakes every waiting getter.
    pub fn shut_down(&self) {
        {
            let mut st = self.lock();
            if st.shutting_down {
                return;
            }
            st.shutting_down = true;
        }
        self.inner.timers.cancel();
        self.inner.ready.notify_waiters();
        self.inner.emitter.emit(Event::new(EventKind::QueueShutDown));
    }

    /// Shuts down, then waits until every checked-out key has been marked done.
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().processing.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// True once [`shut_down`](Self::shut_down) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Keys waiting for delivery.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// True if no key is waiting for delivery.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Keys currently checked out.
    pub fn processing_len(&self) -> usize {
        self.lock().processing.len()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        // Every critical section leaves the sets consistent before it can panic.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
