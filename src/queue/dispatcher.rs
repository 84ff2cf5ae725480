//! # Dispatcher: rate-limited retry loop over a [`RateLimitingQueue`].
//!
//! Pulls one key at a time, runs the [`Handler`](crate::Handler) and decides what
//! happens to the key next.
//!
//! ## Flow
//! ```text
//! process_next(ctx)
//!   ├─► get() (cancellable) ── None / ctx cancelled ──► return None (stop)
//!   ├─► key_format.parse ── malformed ──► forget, ItemInvalid, Outcome::Invalid
//!   ├─► handler.handle(child ctx, key)
//!   │     ├─ Ok               ─► forget                                ─► ItemProcessed
//!   │     ├─ Err(!retryable)  ─► forget (no retry)                     ─► ItemCanceled
//!   │     └─ Err(retryable)
//!   │          ├─ requeues < max_retries ─► add_rate_limited(key)     ─► ItemRequeued
//!   │          └─ otherwise              ─► forget, RetriesExhausted  ─► ItemAbandoned
//!   └─► done(key)
//! ```
//!
//! ## Rules
//! - A key is handled by at most one worker at a time (delivery queue guarantee).
//! - Cancelling `ctx` stops workers at the next `get`; an in-flight handler sees the
//!   child token cancelled and finishes its key before the worker exits.
//! - A panicking handler counts as a transient failure.
//! - Invalid and requeued items are logged at `warn`, abandoned ones at `error`,
//!   whether or not a [`Bus`] is attached.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::RetryConfig;
use crate::error::{DispatchError, HandlerError};
use crate::events::{Bus, Emitter, Event, EventKind};
use crate::handlers::HandlerRef;
use crate::queue::{KeyFormat, ObjectKey, RateLimitingQueue};
use crate::subscribers::panic_message;

/// Result of one [`Dispatcher::process_next`] step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded on the given 1-based attempt.
    Processed {
        /// Key that was handled.
        key: String,
        /// Attempt that succeeded.
        attempt: u32,
    },
    /// Handler failed; the key comes back after `delay`.
    Requeued {
        /// Key that was requeued.
        key: String,
        /// Attempt that failed.
        attempt: u32,
        /// Backoff before the next delivery.
        delay: Duration,
    },
    /// Retry ceiling reached; the key was forgotten.
    Abandoned(DispatchError),
    /// Handler observed cancellation; the key was dropped without retry.
    Canceled {
        /// Key that was dropped.
        key: String,
    },
    /// Item was not a well-formed key; dropped without retry.
    Invalid(DispatchError),
}

/// Rate-limited retry dispatcher.
pub struct Dispatcher {
    name: Arc<str>,
    queue: RateLimitingQueue<String>,
    handler: HandlerRef,
    max_retries: u32,
    key_format: KeyFormat,
    emitter: Emitter,
}

impl Dispatcher {
    /// Creates a dispatcher named `name` running `handler` under `retry`.
    ///
    /// Events are published on `bus` when one is given.
    pub fn new(name: &str, handler: HandlerRef, retry: RetryConfig, bus: Option<Bus>) -> Self {
        Self {
            name: name.into(),
            queue: RateLimitingQueue::named(name, retry.backoff, bus.clone()),
            handler,
            max_retries: retry.max_retries,
            key_format: KeyFormat::default(),
            emitter: Emitter::new(bus, name),
        }
    }

    /// Sets how raw items are parsed into keys (default [`KeyFormat::NamespacedName`]).
    pub fn with_key_format(mut self, format: KeyFormat) -> Self {
        self.key_format = format;
        self
    }

    /// Dispatcher name (used as event source).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue feeding this dispatcher.
    pub fn queue(&self) -> &RateLimitingQueue<String> {
        &self.queue
    }

    /// Adds a key for processing. Returns `false` after shutdown.
    pub fn enqueue(&self, key: impl Into<String>) -> bool {
        self.queue.add(key.into())
    }

    /// Stops accepting keys; workers exit once the backlog is drained.
    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    /// Takes one key, handles it and settles its fate.
    ///
    /// Returns `None` when the queue is shut down and empty, or `ctx` is cancelled
    /// while waiting for a key.
    pub async fn process_next(&self, ctx: &CancellationToken) -> Option<Outcome> {
        let raw = tokio::select! {
            biased;
            _ = ctx.cancelled() => return None,
            key = self.queue.get() => key?,
        };

        let outcome = self.process(ctx, &raw).await;
        self.queue.done(&raw);
        Some(outcome)
    }

    async fn process(&self, ctx: &CancellationToken, raw: &String) -> Outcome {
        let key = match self.key_format.parse(raw) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(dispatcher = %self.name, key = %raw, error = %err, "dropping malformed item");
                self.queue.forget(raw);
                self.emitter.emit(
                    Event::new(EventKind::ItemInvalid)
                        .with_key(raw.as_str())
                        .with_reason(err.to_string()),
                );
                return Outcome::Invalid(err);
            }
        };

        let requeues = self.queue.num_requeues(raw);
        let attempt = requeues.saturating_add(1);

        match self.invoke(ctx, &key).await {
            Ok(()) => {
                tracing::debug!(dispatcher = %self.name, key = %raw, attempt, "item processed");
                self.queue.forget(raw);
                self.emitter.emit(
                    Event::new(EventKind::ItemProcessed)
                        .with_key(raw.as_str())
                        .with_attempt(attempt),
                );
                Outcome::Processed {
                    key: raw.clone(),
                    attempt,
                }
            }
            Err(err) if !err.is_retryable() => {
                tracing::debug!(dispatcher = %self.name, key = %raw, error = %err, "item canceled");
                self.queue.forget(raw);
                self.emitter
                    .emit(Event::new(EventKind::ItemCanceled).with_key(raw.as_str()));
                Outcome::Canceled { key: raw.clone() }
            }
            Err(err) if requeues < self.max_retries => {
                let delay = self.queue.add_rate_limited(raw.clone());
                tracing::warn!(
                    dispatcher = %self.name,
                    key = %raw,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "handler failed, requeued"
                );
                self.emitter.emit(
                    Event::new(EventKind::ItemRequeued)
                        .with_key(raw.as_str())
                        .with_attempt(attempt)
                        .with_delay(delay)
                        .with_reason(err.to_string()),
                );
                Outcome::Requeued {
                    key: raw.clone(),
                    attempt,
                    delay,
                }
            }
            Err(err) => {
                self.queue.forget(raw);
                let err = DispatchError::RetriesExhausted {
                    key: raw.clone(),
                    retries: requeues,
                    source: err,
                };
                tracing::error!(dispatcher = %self.name, key = %raw, attempt, error = %err, "giving up on item");
                self.emitter.emit(
                    Event::new(EventKind::ItemAbandoned)
                        .with_key(raw.as_str())
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                );
                Outcome::Abandoned(err)
            }
        }
    }

    async fn invoke(&self, ctx: &CancellationToken, key: &ObjectKey) -> Result<(), HandlerError> {
        let fut = self.handler.handle(ctx.child_token(), key);
        match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(HandlerError::fail(format!(
                "handler {} panicked: {}",
                self.handler.name(),
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Processes keys until the queue shuts down or `ctx` is cancelled.
    pub async fn run_worker(&self, ctx: CancellationToken, worker_id: usize) {
        let span = tracing::debug_span!("worker", dispatcher = %self.name, worker_id);
        async {
            tracing::debug!("worker started");
            while self.process_next(&ctx).await.is_some() {}
            tracing::debug!("worker stopped");
        }
        .instrument(span)
        .await
    }

    /// Runs `workers` concurrent workers (at least one).
    ///
    /// Returns when `ctx` is cancelled (the queue is then shut down and workers
    /// finish their current key) or when every worker exits on its own.
    pub async fn run(self: Arc<Self>, ctx: CancellationToken, workers: usize) {
        let mut set = JoinSet::new();
        for worker_id in 0..workers.max(1) {
            let me = Arc::clone(&self);
            let ctx = ctx.clone();
            set.spawn(async move { me.run_worker(ctx, worker_id).await });
        }

        let drained = tokio::select! {
            _ = ctx.cancelled() => false,
            _ = async { while set.join_next().await.is_some() {} } => true,
        };
        if !drained {
            self.shut_down();
            while set.join_next().await.is_some() {}
        }
    }
}
