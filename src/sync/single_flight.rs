//! # SingleFlight: in-flight call registry.
//!
//! Collapses concurrent calls that share a dedup key into one execution. The
//! first caller starts the call; everyone arriving while it is still running
//! joins it and receives a clone of the same result.
//!
//! ```text
//! join_or_start(k, f)
//!   ├─ k in flight  → joiners += 1 → Flight { shared: true,  fut: existing }
//!   └─ k idle       → spawn(f(call_token)) ─► on completion: remove k ─► resolve all joiners
//!                     Flight { shared: false, fut: new }
//!
//! drop(Flight) → joiners -= 1 → 0 joiners left: call_token.cancel()
//! ```
//!
//! ## Rules
//! - The call runs on its own task: callers that stop waiting (timeout, cancel)
//!   do **not** abort it, and later callers join it instead of starting a second one.
//! - The call gets its own [`CancellationToken`]. It fires only once every joiner
//!   has dropped its [`Flight`]; one caller giving up never cancels the others.
//! - The key is released before joiners observe the result, so a caller that
//!   has seen the result and calls again starts a fresh execution.
//! - A panic inside the call is caught and delivered to every joiner as
//!   [`FlightError::Panicked`].

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

use crate::error::FlightError;
use crate::subscribers::panic_message;

type SharedCall<V> = Shared<BoxFuture<'static, Result<V, FlightError>>>;

/// Joiner bookkeeping shared by every [`Flight`] of one call.
struct Lease {
    token: CancellationToken,
    joiners: AtomicUsize,
}

impl Lease {
    fn acquire(self: &Arc<Self>) -> Arc<Self> {
        self.joiners.fetch_add(1, Ordering::AcqRel);
        Arc::clone(self)
    }
}

struct Call<V> {
    id: u64,
    fut: SharedCall<V>,
    lease: Arc<Lease>,
}

struct Registry<K, V> {
    next_id: u64,
    calls: HashMap<K, Call<V>>,
}

/// Registry of in-flight calls keyed by a dedup key.
pub struct SingleFlight<K, V> {
    inner: Arc<Mutex<Registry<K, V>>>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                calls: HashMap::new(),
            })),
        }
    }

    /// Joins the call in flight for `key`, or starts `make(token)` if there is none.
    ///
    /// `make` is only invoked when a new call is started; `token` is cancelled once
    /// every [`Flight`] for the call has been dropped. Must be called inside a tokio
    /// runtime.
    pub fn join_or_start<F, Fut>(&self, key: K, make: F) -> Flight<V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let mut reg = self.lock();
        if let Some(call) = reg.calls.get(&key) {
            return Flight {
                shared: true,
                fut: call.fut.clone(),
                lease: call.lease.acquire(),
            };
        }

        let id = reg.next_id;
        reg.next_id += 1;

        let lease = Arc::new(Lease {
            token: CancellationToken::new(),
            joiners: AtomicUsize::new(0),
        });
        let work = make(lease.token.clone());
        let registry = Arc::clone(&self.inner);
        let release_key = key.clone();
        let handle = tokio::spawn(async move {
            let out = std::panic::AssertUnwindSafe(work).catch_unwind().await;
            {
                let mut reg = registry.lock().unwrap_or_else(PoisonError::into_inner);
                if reg.calls.get(&release_key).is_some_and(|c| c.id == id) {
                    reg.calls.remove(&release_key);
                }
            }
            out.map_err(|panic| FlightError::Panicked(panic_message(panic.as_ref()).into()))
        });

        let fut: SharedCall<V> = async move {
            match handle.await {
                Ok(out) => out,
                Err(join) => Err(FlightError::Panicked(join.to_string().into())),
            }
        }
        .boxed()
        .shared();

        reg.calls.insert(
            key,
            Call {
                id,
                fut: fut.clone(),
                lease: Arc::clone(&lease),
            },
        );
        Flight {
            shared: false,
            fut,
            lease: lease.acquire(),
        }
    }

    /// True while a call for `key` is running.
    pub fn in_flight(&self, key: &K) -> bool {
        self.lock().calls.contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, Registry<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a (possibly shared) in-flight call. Resolves to the call's result.
///
/// Dropping the last handle of a call cancels the call's token.
pub struct Flight<V> {
    shared: bool,
    fut: SharedCall<V>,
    lease: Arc<Lease>,
}

impl<V> Flight<V> {
    /// True if this handle joined a call started by someone else.
    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

impl<V> Drop for Flight<V> {
    fn drop(&mut self) {
        if self.lease.joiners.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lease.token.cancel();
        }
    }
}

impl<V: Clone> Future for Flight<V> {
    type Output = Result<V, FlightError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.fut).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let sf = SingleFlight::<&'static str, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut flights = Vec::new();
        for _ in 0..5 {
            let calls = calls.clone();
            let gate = gate.clone();
            flights.push(sf.join_or_start("ping", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                42
            }));
        }
        assert!(!flights[0].is_shared());
        assert!(flights[1..].iter().all(Flight::is_shared));
        assert!(sf.in_flight(&"probe"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.notify_one();

        for f in flights {
            assert_eq!(f.await, Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!sf.in_flight(&"probe"));
    }

    #[tokio::test]
    async fn completed_key_starts_fresh_call() {
        let sf = SingleFlight::<u8, usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let calls = calls.clone();
            let v = sf
                .join_or_start(1, move |_| async move { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(v, Ok(expected));
        }
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_cancel_call() {
        let sf = SingleFlight::<u8, &'static str>::new();
        let gate = Arc::new(Notify::new());

        let g = gate.clone();
        let first = sf.join_or_start(0, move |_| async move {
            g.notified().await;
            "done"
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), first).await.is_err());

        // Still running: the next caller joins it.
        let second = sf.join_or_start(0, |_| async { "unused" });
        assert!(second.is_shared());
        gate.notify_one();
        assert_eq!(second.await, Ok("done"));
    }

    #[tokio::test]
    async fn call_token_fires_only_after_last_joiner_leaves() {
        let sf = SingleFlight::<u8, &'static str>::new();
        let observed = Arc::new(Notify::new());

        let seen = observed.clone();
        let first = sf.join_or_start(0, move |token| async move {
            token.cancelled().await;
            seen.notify_one();
            "canceled"
        });
        let second = sf.join_or_start(0, |_| async { "unused" });
        assert!(second.is_shared());

        drop(first);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), observed.notified())
                .await
                .is_err()
        );
        assert!(sf.in_flight(&0));

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), observed.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn panic_is_reported_to_joiners() {
        let sf = SingleFlight::<u8, u8>::new();
        let out = sf
            .join_or_start(0, |_| async {
                if true {
                    panic!("provider exploded");
                }
                0
            })
            .await;
        match out {
            Err(FlightError::Panicked(msg)) => assert!(msg.contains("provider exploded")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!sf.in_flight(&0));
    }
}
