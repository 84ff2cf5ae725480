//! # BroadcastCell: single-slot, versioned value with wake-all waiters.
//!
//! A writer publishes values with [`BroadcastCell::set`]; any number of readers
//! either wait for the next publish or read the latest value without blocking.
//!
//! ```text
//! set(v) ──► lock ──► value = v, generation += 1 ──► fire every waiter ──► waiters.clear()
//!
//! Subscription { seen }:
//!   changed()  → returns at once if generation > seen, else registers a oneshot and waits
//!   latest()   → (value, generation) or None, never blocks
//! ```
//!
//! ## Rules
//! - `generation` strictly increases on every publish.
//! - Every waiter registered before a publish is signalled exactly once for it.
//! - Waiters whose futures were dropped (caller cancelled) are pruned, never signalled.
//! - The lock is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::WaitError;

/// A value together with the generation it was published under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Published value.
    pub value: T,
    /// Generation (1-based) of this publish.
    pub generation: u64,
}

struct State<T> {
    value: Option<T>,
    generation: u64,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Single-slot broadcast store.
///
/// Cheap to clone; clones share the same slot.
pub struct BroadcastCell<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for BroadcastCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> Default for BroadcastCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> BroadcastCell<T> {
    /// Creates an empty cell (generation 0, no value).
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value: None,
                generation: 0,
                waiters: Vec::new(),
            })),
        }
    }

    /// Publishes `value` and wakes every registered waiter.
    ///
    /// Returns the new generation.
    pub fn set(&self, value: T) -> u64 {
        let (generation, waiters) = {
            let mut st = self.lock();
            st.value = Some(value);
            st.generation += 1;
            (st.generation, std::mem::take(&mut st.waiters))
        };
        for w in waiters {
            let _ = w.send(());
        }
        generation
    }

    /// Returns a subscription whose baseline is the current generation.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            cell: self.clone(),
            seen: self.generation(),
        }
    }

    /// Latest value and its generation, or `None` if nothing was ever published.
    pub fn latest(&self) -> Option<Versioned<T>> {
        let st = self.lock();
        st.value.as_ref().map(|v| Versioned {
            value: v.clone(),
            generation: st.generation,
        })
    }

    /// Current generation (`0` until the first publish).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Blocks until any value exists, then returns the latest one.
    ///
    /// Returns immediately once the cell has been set at least once. Fails only if
    /// `token` is cancelled first.
    pub async fn wait_first(&self, token: &CancellationToken) -> Result<Versioned<T>, WaitError> {
        Subscription {
            cell: self.clone(),
            seen: 0,
        }
        .changed(token)
        .await
    }

    /// Registers a waiter unless a generation newer than `seen` is already available.
    fn register(&self, seen: u64) -> Result<Versioned<T>, oneshot::Receiver<()>> {
        let mut st = self.lock();
        if st.generation > seen {
            if let Some(v) = st.value.as_ref() {
                return Ok(Versioned {
                    value: v.clone(),
                    generation: st.generation,
                });
            }
        }
        st.waiters.retain(|w| !w.is_closed());
        let (tx, rx) = oneshot::channel();
        st.waiters.push(tx);
        Err(rx)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }
}

/// Reader handle remembering the last generation it observed.
pub struct Subscription<T> {
    cell: BroadcastCell<T>,
    seen: u64,
}

impl<T: Clone> Subscription<T> {
    /// Waits until a generation newer than the last observed one is published.
    ///
    /// On success the subscription advances to the returned generation, so the next
    /// call waits for the publish after that. Cancelling `token` unblocks only this
    /// caller.
    pub async fn changed(&mut self, token: &CancellationToken) -> Result<Versioned<T>, WaitError> {
        loop {
            match self.cell.register(self.seen) {
                Ok(v) => {
                    self.seen = v.generation;
                    return Ok(v);
                }
                Err(rx) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(WaitError::Canceled),
                        _ = rx => {}
                    }
                }
            }
        }
    }

    /// Latest value without blocking; does not advance the subscription.
    pub fn latest(&self) -> Option<Versioned<T>> {
        self.cell.latest()
    }

    /// Generation this subscription last observed.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}
