//! # KeySerializingQueue: latest payload per key, one worker per key.
//!
//! Built on a [`DeliveryQueue`] of keys plus a side map of pending payloads.
//!
//! ```text
//! enqueue(k, p) ──► payloads[k] = p (overwrite) ──► queue.add(k)
//!
//! do_work(cb)
//!   ├─► get() ── None ──► false
//!   ├─► p = payloads.remove(k)
//!   ├─► cb(p) ── true  ──────────────────────────────────────► done(k)
//!   │         └─ false ─► payloads[k] ??= p ─► add(k) (dirty) ─► done(k) ─► redelivered
//!   └─► true
//! ```
//!
//! ## Rules
//! - Payloads enqueued for a key before it is picked up collapse to the last one.
//! - A payload enqueued while the key is being worked on is delivered afterwards.
//! - On failure the old payload is restored only if nothing newer arrived.
//! - A key picked from the queue always has a payload; anything else is a bug.
//!   Payload map and dirty marks change together under the payload lock, so a
//!   checked-out key is dirty exactly when a payload is waiting for it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::events::Bus;
use crate::queue::DeliveryQueue;

/// Key-serializing payload queue. Cheap to clone; clones share state.
pub struct KeySerializingQueue<P> {
    queue: DeliveryQueue<String>,
    payloads: Arc<Mutex<HashMap<String, P>>>,
}

impl<P> Clone for KeySerializingQueue<P> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            payloads: Arc::clone(&self.payloads),
        }
    }
}

impl<P: Clone + Send + 'static> Default for KeySerializingQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + Send + 'static> KeySerializingQueue<P> {
    /// Creates an unobserved queue.
    pub fn new() -> Self {
        Self::from_queue(DeliveryQueue::new())
    }

    /// Creates a queue that reports its shutdown on `bus` under `name`.
    pub fn named(name: &str, bus: Option<Bus>) -> Self {
        Self::from_queue(DeliveryQueue::named(name, bus))
    }

    fn from_queue(queue: DeliveryQueue<String>) -> Self {
        Self {
            queue,
            payloads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stores `payload` as the latest for `key` and schedules the key.
    ///
    /// Returns `false` (and stores nothing) once the queue is stopped.
    pub fn enqueue(&self, key: impl Into<String>, payload: P) -> bool {
        let key = key.into();
        let mut payloads = self.lock();
        if self.queue.is_shutting_down() {
            return false;
        }
        payloads.insert(key.clone(), payload);
        self.queue.add(key)
    }

    /// Takes one key and runs `callback` on its payload.
    ///
    /// Returns `false` once the queue is stopped and drained.
    ///
    /// # Panics
    /// If a delivered key has no stored payload.
    pub async fn do_work<F, Fut>(&self, callback: F) -> bool
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = bool>,
    {
        match self.queue.get().await {
            Some(key) => {
                self.work_on(key, callback).await;
                true
            }
            None => false,
        }
    }

    /// Runs `do_work` until the queue is stopped or `token` is cancelled.
    ///
    /// Cancellation is observed between items; a running callback is not interrupted.
    pub async fn run_worker<F, Fut>(&self, token: CancellationToken, callback: F)
    where
        F: Fn(P) -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            let key = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                key = self.queue.get() => key,
            };
            match key {
                Some(key) => self.work_on(key, &callback).await,
                None => break,
            }
        }
    }

    /// Stops the queue. Already-scheduled keys are still delivered.
    pub fn stop(&self) {
        self.queue.shut_down();
    }

    /// Number of keys waiting for delivery.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no key is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    async fn work_on<F, Fut>(&self, key: String, callback: F)
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = bool>,
    {
        let payload = {
            let mut payloads = self.lock();
            // Whatever was enqueued while the key sat checked out is consumed now;
            // a dirty mark left behind would redeliver the key with no payload.
            self.queue.clear_dirty(&key);
            payloads.remove(&key)
        };
        let Some(payload) = payload else {
            self.queue.done(&key);
            panic!("key {key} delivered without a payload");
        };

        if !callback(payload.clone()).await {
            let mut payloads = self.lock();
            let restored = !payloads.contains_key(&key);
            if restored {
                payloads.insert(key.clone(), payload);
            }
            if !self.queue.add(key.clone()) && restored {
                // Stopped: nothing will deliver the key again.
                payloads.remove(&key);
            }
        }
        self.queue.done(&key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, P>> {
        self.payloads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn latest_payload_wins_before_pickup() {
        let q = KeySerializingQueue::new();
        assert!(q.enqueue("pod", 1));
        assert!(q.enqueue("pod", 2));
        assert_eq!(q.len(), 1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        assert!(q.do_work(|p| async move {
            s.lock().unwrap().push(p);
            true
        })
        .await);

        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_newer_payload() {
        let q = KeySerializingQueue::new();
        q.enqueue("pod", "p1");

        let q2 = q.clone();
        assert!(q.do_work(|p| async move {
            assert_eq!(p, "p1");
            q2.enqueue("pod", "p2");
            false
        })
        .await);

        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        assert!(q.do_work(|p| async move {
            *g.lock().unwrap() = Some(p);
            true
        })
        .await);
        assert_eq!(*got.lock().unwrap(), Some("p2"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn failure_redelivers_same_payload() {
        let q = KeySerializingQueue::new();
        q.enqueue("pod", 7);

        assert!(q.do_work(|_| async { false }).await);
        assert_eq!(q.len(), 1);

        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        q.do_work(|p| async move {
            *g.lock().unwrap() = Some(p);
            true
        })
        .await;
        assert_eq!(*got.lock().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn enqueue_during_success_is_delivered_after() {
        let q = KeySerializingQueue::new();
        q.enqueue("pod", 1);

        let q2 = q.clone();
        q.do_work(|_| async move {
            q2.enqueue("pod", 2);
            true
        })
        .await;
        assert_eq!(q.len(), 1);

        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        q.do_work(|p| async move {
            *g.lock().unwrap() = Some(p);
            true
        })
        .await;
        assert_eq!(*got.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn stop_drains_then_reports_false() {
        let q = KeySerializingQueue::new();
        q.enqueue("a", 1);
        q.stop();
        assert!(!q.enqueue("b", 2));

        assert!(q.do_work(|_| async { true }).await);
        assert!(!q.do_work(|_| async { true }).await);
    }

    #[tokio::test]
    async fn run_worker_serializes_per_key() {
        let q: KeySerializingQueue<usize> = KeySerializingQueue::new();
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let mut workers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            let token = token.clone();
            let (active, overlaps, handled) = (active.clone(), overlaps.clone(), handled.clone());
            workers.push(tokio::spawn(async move {
                q.run_worker(token, move |_p| {
                    let (active, overlaps, handled) =
                        (active.clone(), overlaps.clone(), handled.clone());
                    async move {
                        if active.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        handled.fetch_add(1, Ordering::SeqCst);
                        true
                    }
                })
                .await;
            }));
        }

        for i in 0..20 {
            q.enqueue("same", i);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        q.stop();
        for w in workers {
            tokio::time::timeout(Duration::from_secs(2), w).await.unwrap().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(handled.load(Ordering::SeqCst) >= 1);
        assert!(q.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_enqueues_never_strand_a_key() {
        let q: KeySerializingQueue<u64> = KeySerializingQueue::new();
        let handled = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let q = q.clone();
                let token = token.clone();
                let handled = handled.clone();
                tokio::spawn(async move {
                    q.run_worker(token, move |_p| {
                        let handled = handled.clone();
                        async move {
                            handled.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            true
                        }
                    })
                    .await;
                })
            })
            .collect();

        let producers: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || {
                    let until = std::time::Instant::now() + Duration::from_millis(500);
                    let mut i = 0u64;
                    while std::time::Instant::now() < until {
                        q.enqueue("k", i);
                        i += 1;
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        q.stop();
        for w in workers {
            tokio::time::timeout(Duration::from_secs(5), w)
                .await
                .unwrap()
                .unwrap();
        }
        assert!(handled.load(Ordering::SeqCst) >= 1);
        assert!(q.is_empty());
        assert!(q.lock().is_empty());
    }

    #[tokio::test]
    async fn run_worker_exits_on_cancel() {
        let q: KeySerializingQueue<u8> = KeySerializingQueue::new();
        let token = CancellationToken::new();
        let q2 = q.clone();
        let t = token.clone();
        let h = tokio::spawn(async move { q2.run_worker(t, |_| async { true }).await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), h).await.unwrap().unwrap();
    }
}
