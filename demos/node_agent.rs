//! # Example: node_agent
//!
//! A miniature virtual-node agent wired from every nodevisor component.
//!
//! Shows how to:
//! - Render runtime events through `tracing` with [`LogWriter`].
//! - Probe a backend periodically with [`NodeProbeController`].
//! - Reconcile pods with a retrying [`Dispatcher`].
//! - Push latest-wins status payloads through a [`KeySerializingQueue`].
//!
//! ## Flow
//! ```text
//! Bus ──► SubscriberSet ──► LogWriter ──► tracing
//!  ▲
//!  ├── NodeProbeController::run()   (probe every 200ms, 100ms timeout)
//!  ├── Dispatcher::run()            (2 workers, pods fail twice then succeed)
//!  └── KeySerializingQueue          (status updates, one worker)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example node_agent
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nodevisor::{
    BackoffPolicy, Bus, Config, Dispatcher, HandlerError, HandlerFn, HandlerRef,
    KeySerializingQueue, LogWriter, NodeProbeController, ObjectKey, ProbeConfig, ProbeFn,
    ProviderError, RetryConfig, Subscribe, SubscriberSet,
};

/// Pod handler whose backend rejects the first two attempts for every key.
fn flaky_pod_handler() -> HandlerRef {
    let attempts: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
    HandlerFn::arc("sync-pod", move |_ctx: CancellationToken, key: ObjectKey| {
        let attempts = attempts.clone();
        async move {
            let n = {
                let mut map = attempts.lock().unwrap();
                let n = map.entry(key.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if n <= 2 {
                return Err(HandlerError::fail(format!("backend busy (attempt {n})")));
            }
            tracing::info!(%key, "pod reconciled");
            Ok(())
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        probe: ProbeConfig::new(Duration::from_millis(200), Some(Duration::from_millis(100)))?,
        retry: RetryConfig {
            max_retries: 5,
            backoff: BackoffPolicy {
                first: Duration::from_millis(50),
                ..BackoffPolicy::default()
            },
        },
        workers: 2,
        ..Config::default()
    };

    let token = CancellationToken::new();
    let bus = Bus::new(cfg.bus_capacity_clamped());
    let subs = Arc::new(SubscriberSet::with_bus(
        vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>],
        bus.clone(),
    ));
    let listener = subs.clone().listen(&bus, token.clone());

    // Health probe: every third call hangs past the timeout.
    let calls = Arc::new(Mutex::new(0u32));
    let prober = ProbeFn::arc("backend-ping", move |ctx: CancellationToken| {
        let calls = calls.clone();
        async move {
            let n = {
                let mut c = calls.lock().unwrap();
                *c += 1;
                *c
            };
            if n % 3 == 0 {
                ctx.cancelled().await;
                return Err(ProviderError::Canceled);
            }
            Ok(())
        }
    });
    let probe = Arc::new(NodeProbeController::new(prober, cfg.probe.clone())?.with_bus(bus.clone()));
    let probe_task = {
        let probe = probe.clone();
        let token = token.clone();
        tokio::spawn(async move { probe.run(token).await })
    };

    // Pod reconciliation.
    let pods = Arc::new(Dispatcher::new("pods", flaky_pod_handler(), cfg.retry.clone(), Some(bus.clone())));
    for key in ["default/web-0", "default/web-1", "kube-system/dns", "bad/key/shape"] {
        pods.enqueue(key);
    }
    let pods_task = tokio::spawn(pods.clone().run(token.clone(), cfg.worker_count()));

    // Status updates: rapid updates for one pod collapse to the latest.
    let status: KeySerializingQueue<String> = KeySerializingQueue::named("status", Some(bus.clone()));
    for phase in ["Pending", "ContainerCreating", "Running"] {
        status.enqueue("default/web-0", phase.to_string());
    }
    let status_task = {
        let status = status.clone();
        let token = token.clone();
        tokio::spawn(async move {
            status
                .run_worker(token, |phase| async move {
                    tracing::info!(%phase, "status pushed");
                    true
                })
                .await
        })
    };

    let health = probe.latest_result(&token).await?;
    tracing::info!(healthy = health.is_healthy(), "first probe result");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    status.stop();
    token.cancel();
    let _ = tokio::join!(probe_task, pods_task, status_task, listener);
    if let Ok(subs) = Arc::try_unwrap(subs) {
        subs.shutdown().await;
    }
    Ok(())
}
