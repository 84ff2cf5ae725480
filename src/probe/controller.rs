//! # NodeProbeController: periodic backend health probe.
//!
//! ```text
//! run(token)
//!   loop {
//!     cycle ──► publish ProbeResult ──► sleep(interval) ─┐   (until token cancelled)
//!   }  ◄───────────────────────────────────────────────────┘
//!
//! cycle(token)
//!   flight = single_flight.join_or_start("node-probe", |call_ctx| prober.probe(call_ctx))
//!   select {
//!     flight done      → ProbeResult { observed_at: call start, error: provider error }
//!     timeout elapsed  → ProbeError::Timeout
//!     token cancelled  → ProbeError::Canceled
//!   }
//!   cell.set(result); bus.publish(Probe* event)
//! ```
//!
//! ## Rules
//! - At most one backend probe runs at a time: a cycle that finds one still in
//!   flight (stuck past an earlier timeout, or started by `probe_now`) waits on it.
//! - The backend call's context belongs to the call, not to any caller: it is
//!   cancelled only once every cycle waiting on it has given up (timeout or
//!   cancellation). One caller's cancellation never reaches the others.
//! - Every completed cycle publishes exactly one result, healthy or not.
//! - Readers block only until the first result; afterwards they get the latest at once.

use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::error::{ConfigError, FlightError, ProbeError, WaitError};
use crate::events::{Bus, Emitter, Event, EventKind};
use crate::probe::{ProbeResult, ProberRef};
use crate::sync::{BroadcastCell, SingleFlight, Subscription};

const PROBE_KEY: &str = "node-probe";

type ProbeOutcome = (SystemTime, Result<(), ProbeError>);

/// Periodic, deduplicated, timeout-bounded backend probe.
pub struct NodeProbeController {
    prober: ProberRef,
    config: ProbeConfig,
    results: BroadcastCell<ProbeResult>,
    flights: SingleFlight<&'static str, ProbeOutcome>,
    emitter: Emitter,
}

impl NodeProbeController {
    /// Creates a controller for `prober`.
    ///
    /// Fails if the interval or (when set) the timeout is zero.
    pub fn new(prober: ProberRef, config: ProbeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            prober,
            config,
            results: BroadcastCell::new(),
            flights: SingleFlight::new(),
            emitter: Emitter::default(),
        })
    }

    /// Publishes probe events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.emitter = Emitter::new(Some(bus), PROBE_KEY);
        self
    }

    /// Effective configuration.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probes immediately, then once per `interval` after each cycle ends,
    /// until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            let result = self.probe_now(&token).await;
            tracing::trace!(healthy = result.is_healthy(), "probe cycle finished");

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Runs one probe cycle now and publishes its result.
    ///
    /// Concurrent callers share the same backend call.
    pub async fn probe_now(&self, token: &CancellationToken) -> ProbeResult {
        let prober = self.prober.clone();
        let flight = self.flights.join_or_start(PROBE_KEY, move |ctx| async move {
            let started = SystemTime::now();
            let res = prober.probe(ctx).await.map_err(ProbeError::from);
            (started, res)
        });

        let timeout = self.config.probe_timeout();
        let deadline = async {
            match timeout {
                Some(d) => {
                    tokio::time::sleep(d).await;
                    d
                }
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            biased;
            out = flight => match out {
                Ok((started, Ok(()))) => ProbeResult::healthy(started),
                Ok((started, Err(err))) => ProbeResult::unhealthy(started, err),
                Err(FlightError::Panicked(reason)) => {
                    ProbeResult::unhealthy(SystemTime::now(), ProbeError::Panicked { reason })
                }
            },
            waited = deadline => {
                ProbeResult::unhealthy(SystemTime::now(), ProbeError::Timeout { timeout: waited })
            }
            _ = token.cancelled() => ProbeResult::unhealthy(SystemTime::now(), ProbeError::Canceled),
        };

        self.publish(&result);
        result
    }

    /// Latest published result.
    ///
    /// Waits for the first cycle to finish if none has yet; fails only if `token`
    /// is cancelled first.
    pub async fn latest_result(&self, token: &CancellationToken) -> Result<ProbeResult, WaitError> {
        self.results.wait_first(token).await.map(|v| v.value)
    }

    /// Subscribes to every future result.
    pub fn subscribe(&self) -> Subscription<ProbeResult> {
        self.results.subscribe()
    }

    fn publish(&self, result: &ProbeResult) {
        self.results.set(result.clone());

        let ev = match &result.error {
            None => Event::new(EventKind::ProbeSucceeded),
            Some(ProbeError::Timeout { timeout }) => {
                Event::new(EventKind::ProbeTimedOut).with_timeout(*timeout)
            }
            Some(ProbeError::Canceled) => Event::new(EventKind::ProbeCanceled),
            Some(err) => Event::new(EventKind::ProbeFailed).with_reason(err.to_string()),
        };
        self.emitter.emit(ev);
    }
}

impl std::fmt::Debug for NodeProbeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeProbeController")
            .field("prober", &self.prober.name())
            .field("config", &self.config)
            .field("generation", &self.results.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::probe::ProbeFn;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn counting(calls: Arc<AtomicUsize>, delay: Duration) -> ProberRef {
        ProbeFn::arc("counting", move |_ctx: CancellationToken| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok::<(), ProviderError>(())
            }
        })
    }

    fn cfg(interval_ms: u64, timeout_ms: Option<u64>) -> ProbeConfig {
        ProbeConfig::new(
            Duration::from_millis(interval_ms),
            timeout_ms.map(Duration::from_millis),
        )
        .unwrap()
    }

    #[test]
    fn zero_interval_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ProbeConfig {
            interval: Duration::ZERO,
            ..ProbeConfig::default()
        };
        let err = NodeProbeController::new(counting(calls, Duration::ZERO), config).unwrap_err();
        assert_eq!(err, ConfigError::ZeroInterval);
    }

    #[tokio::test]
    async fn concurrent_probe_now_shares_backend_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = NodeProbeController::new(
            counting(calls.clone(), Duration::from_millis(20)),
            cfg(1000, None),
        )
        .unwrap();
        let token = CancellationToken::new();

        let results =
            futures::future::join_all((0..5).map(|_| c.probe_now(&token))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(ProbeResult::is_healthy));
        assert!(results.windows(2).all(|w| w[0].observed_at == w[1].observed_at));
    }

    #[tokio::test]
    async fn stuck_probe_times_out_and_is_joined_later() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let prober = ProbeFn::arc("stuck", move |_ctx: CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { std::future::pending::<Result<(), ProviderError>>().await }
        });
        let c = NodeProbeController::new(prober, cfg(1000, Some(50))).unwrap();
        let token = CancellationToken::new();

        let start = Instant::now();
        let res = c.probe_now(&token).await;
        let elapsed = start.elapsed();
        assert_eq!(
            res.error,
            Some(ProbeError::Timeout {
                timeout: Duration::from_millis(50)
            })
        );
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(1));

        let again = c.probe_now(&token).await;
        assert!(matches!(again.error, Some(ProbeError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_caller_canceling_does_not_affect_joiners() {
        let prober = ProbeFn::arc("slow", |ctx: CancellationToken| async move {
            tokio::select! {
                _ = ctx.cancelled() => Err(ProviderError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(100)) => Ok(()),
            }
        });
        let c = NodeProbeController::new(prober, cfg(1000, None)).unwrap();
        let leaving = CancellationToken::new();
        let staying = CancellationToken::new();

        let (left, stayed, _) = tokio::join!(
            c.probe_now(&leaving),
            c.probe_now(&staying),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                leaving.cancel();
            }
        );

        assert_eq!(left.error, Some(ProbeError::Canceled));
        assert!(stayed.is_healthy(), "got {:?}", stayed.error);
    }

    #[tokio::test]
    async fn stuck_backend_reaches_readers_as_timeout() {
        let prober = ProbeFn::arc("stuck", |_ctx: CancellationToken| async {
            std::future::pending::<Result<(), ProviderError>>().await
        });
        let c = Arc::new(NodeProbeController::new(prober, cfg(1000, Some(50))).unwrap());
        let token = CancellationToken::new();

        let start = Instant::now();
        let runner = {
            let c = c.clone();
            let token = token.clone();
            tokio::spawn(async move { c.run(token).await })
        };

        let res = tokio::time::timeout(Duration::from_millis(500), c.latest_result(&token))
            .await
            .unwrap()
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(
            res.error,
            Some(ProbeError::Timeout {
                timeout: Duration::from_millis(50)
            })
        );
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));

        token.cancel();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn cooperative_prober_reports_canceled_on_timeout() {
        let prober = ProbeFn::arc("cooperative", |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(ProviderError::Canceled)
        });
        let c = NodeProbeController::new(prober, cfg(1000, Some(20))).unwrap();
        let token = CancellationToken::new();

        let first = c.probe_now(&token).await;
        assert!(matches!(first.error, Some(ProbeError::Timeout { .. })));

        // The timed-out call observed its cancelled context and finished.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!c.flights.in_flight(&PROBE_KEY));
    }

    #[tokio::test]
    async fn provider_error_is_published() {
        let prober = ProbeFn::arc("down", |_ctx: CancellationToken| async {
            Err::<(), _>(ProviderError::Unavailable {
                reason: "connection refused".into(),
            })
        });
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let c = NodeProbeController::new(prober, cfg(1000, None)).unwrap().with_bus(bus);

        let res = c.probe_now(&CancellationToken::new()).await;
        assert!(matches!(res.error, Some(ProbeError::Provider { .. })));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ProbeFailed);
        assert!(ev.reason.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn panicking_prober_yields_panicked() {
        let prober = ProbeFn::arc("boom", |_ctx: CancellationToken| async {
            if true {
                panic!("driver crashed");
            }
            Ok::<(), ProviderError>(())
        });
        let c = NodeProbeController::new(prober, cfg(1000, None)).unwrap();
        let res = c.probe_now(&CancellationToken::new()).await;
        match res.error {
            Some(ProbeError::Panicked { reason }) => assert!(reason.contains("driver crashed")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn latest_result_blocks_until_first_then_returns_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = NodeProbeController::new(counting(calls.clone(), Duration::ZERO), cfg(1000, None))
            .unwrap();
        let token = CancellationToken::new();

        let early = tokio::time::timeout(Duration::from_millis(20), c.latest_result(&token)).await;
        assert!(early.is_err());

        let published = c.probe_now(&token).await;
        let cached = tokio::time::timeout(Duration::from_millis(5), c.latest_result(&token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached, published);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn latest_result_honours_caller_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = NodeProbeController::new(counting(calls, Duration::ZERO), cfg(1000, None)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(c.latest_result(&token).await, Err(WaitError::Canceled));
    }

    #[tokio::test]
    async fn run_probes_immediately_then_periodically() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(
            NodeProbeController::new(counting(calls.clone(), Duration::ZERO), cfg(10, None))
                .unwrap(),
        );
        let token = CancellationToken::new();

        let runner = {
            let c = c.clone();
            let token = token.clone();
            tokio::spawn(async move { c.run(token).await })
        };

        let first = tokio::time::timeout(Duration::from_millis(500), c.latest_result(&token))
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_healthy());

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();

        let n = calls.load(Ordering::SeqCst);
        assert!(n >= 2, "expected periodic probes, got {n}");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), n);
    }
}
