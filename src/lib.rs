//! # nodevisor
//!
//! **Nodevisor** is the control-loop engine of a virtual-node agent.
//!
//! It keeps a backend's health observable and turns external triggers into
//! reconciliation calls that are deduplicated, serialized per key and retried
//! with bounded exponential backoff. The crate is a building block: the backend
//! adapter and the orchestrator watch live in the embedding agent.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   triggers (watch events)                          health readers
//!        │               │                                 ▲
//!        ▼               ▼                                 │ latest_result()
//! ┌──────────────┐ ┌─────────────────────┐      ┌──────────┴────────────┐
//! │  Dispatcher  │ │ KeySerializingQueue │      │  NodeProbeController  │
//! │ (retry loop) │ │ (latest payload/key)│      │ (interval + timeout)  │
//! └──────┬───────┘ └──────────┬──────────┘      └──────────┬────────────┘
//!        │ RateLimitingQueue  │                            │
//!        ▼                    ▼                            ▼
//! ┌─────────────────────────────────────┐       ┌───────────────────────┐
//! │ DeliveryQueue (dedup + checkout)    │       │ SingleFlight + Cell   │
//! └──────┬──────────────────────────────┘       └──────────┬────────────┘
//!        │ Handler::handle(ctx, key)                       │ Prober::probe(ctx)
//!        ▼                                                 ▼
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                    backend adapter (user code)                     │
//! └────────────────────────────────────────────────────────────────────┘
//!
//!  every component ──publish──► Bus (broadcast) ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Dispatcher step
//! ```text
//! key = queue.get()                      (None → worker exits)
//!   ├─ malformed            ─► forget, ItemInvalid
//!   ├─ handler Ok           ─► forget, ItemProcessed
//!   ├─ handler Canceled     ─► forget, ItemCanceled
//!   └─ handler Fail
//!        ├─ requeues < max  ─► add_rate_limited(key), ItemRequeued
//!        └─ otherwise       ─► forget, ItemAbandoned
//! queue.done(key)
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                                  |
//! |-------------------|-----------------------------------------------------------------|-----------------------------------------------------|
//! | **Queues**        | Deduplicating, rate-limited and key-serializing work queues.    | [`DeliveryQueue`], [`RateLimitingQueue`], [`KeySerializingQueue`] |
//! | **Dispatch**      | Worker loop with retry ceiling and backoff.                     | [`Dispatcher`], [`Handler`], [`HandlerFn`]          |
//! | **Probing**       | Periodic, deduplicated, timeout-bounded health probe.           | [`NodeProbeController`], [`Prober`], [`ProbeFn`]    |
//! | **Sync**          | Broadcast value cell and in-flight call deduplication.          | [`BroadcastCell`], [`SingleFlight`]                 |
//! | **Policies**      | Backoff curves and per-key failure tracking.                    | [`BackoffPolicy`], [`JitterPolicy`], [`RateLimiter`]|
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers).| [`Subscribe`], [`SubscriberSet`], [`LogWriter`]     |
//! | **Errors**        | Typed errors for handlers, dispatch, probing and config.        | [`HandlerError`], [`DispatchError`], [`ProbeError`] |
//! | **Configuration** | Plain settings structs with defaults.                           | [`Config`], [`ProbeConfig`], [`RetryConfig`]        |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use nodevisor::{
//!     Dispatcher, HandlerError, HandlerFn, HandlerRef, NodeProbeController, ObjectKey,
//!     ProbeConfig, ProbeFn, ProviderError, RetryConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = CancellationToken::new();
//!
//!     let probe = NodeProbeController::new(
//!         ProbeFn::arc("ping", |_ctx: CancellationToken| async { Ok::<(), ProviderError>(()) }),
//!         ProbeConfig::new(Duration::from_secs(10), Some(Duration::from_secs(2)))?,
//!     )?;
//!     assert!(probe.probe_now(&token).await.is_healthy());
//!
//!     let sync: HandlerRef = HandlerFn::arc("sync-pod", |_ctx: CancellationToken, key: ObjectKey| async move {
//!         println!("reconciling {key}");
//!         Ok::<(), HandlerError>(())
//!     });
//!     let dispatcher = Arc::new(Dispatcher::new("pods", sync, RetryConfig::default(), None));
//!     dispatcher.enqueue("default/web-0");
//!     dispatcher.shut_down();
//!     dispatcher.run(token, 2).await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod handlers;
mod policies;
mod probe;
mod queue;
mod subscribers;
mod sync;

// ---- Public re-exports ----

pub use config::{Config, ProbeConfig, RetryConfig};
pub use error::{
    ConfigError, DispatchError, FlightError, HandlerError, ProbeError, ProviderError, WaitError,
};
pub use events::{Bus, Event, EventKind};
pub use handlers::{Handler, HandlerFn, HandlerRef};
pub use policies::{BackoffPolicy, JitterPolicy, RateLimiter};
pub use probe::{NodeProbeController, ProbeFn, ProbeResult, Prober, ProberRef};
pub use queue::{
    DeliveryQueue, Dispatcher, KeyFormat, KeySerializingQueue, ObjectKey, Outcome,
    RateLimitingQueue,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use sync::{BroadcastCell, Flight, SingleFlight, Subscription, Versioned};
