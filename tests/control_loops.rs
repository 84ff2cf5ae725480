use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use nodevisor::{
    BackoffPolicy, BroadcastCell, Bus, Dispatcher, Event, EventKind, HandlerError, HandlerFn,
    HandlerRef, KeySerializingQueue, NodeProbeController, ObjectKey, ProbeConfig, ProbeError,
    ProbeFn, ProviderError, RetryConfig, Subscribe, SubscriberSet,
};

#[derive(Default)]
struct Collect {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Collect {
    async fn on_event(&self, ev: &Event) {
        self.kinds.lock().unwrap().push(ev.kind);
    }
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        backoff: BackoffPolicy::constant(Duration::from_millis(1)),
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatcher_never_runs_one_key_twice_concurrently() {
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::default();
    let overlaps = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let handler: HandlerRef = {
        let (in_flight, overlaps, handled) = (in_flight.clone(), overlaps.clone(), handled.clone());
        HandlerFn::arc("track", move |_ctx: CancellationToken, key: ObjectKey| {
            let (in_flight, overlaps, handled) = (in_flight.clone(), overlaps.clone(), handled.clone());
            async move {
                let k = key.to_string();
                if !in_flight.lock().unwrap().insert(k.clone()) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_flight.lock().unwrap().remove(&k);
                handled.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
    };

    let d = Arc::new(Dispatcher::new("pods", handler, fast_retry(3), None));
    let token = CancellationToken::new();
    let runner = tokio::spawn(d.clone().run(token.clone(), 8));

    for round in 0..50 {
        for i in 0..4 {
            d.enqueue(format!("ns/pod-{}", (round + i) % 4));
        }
        tokio::task::yield_now().await;
    }

    wait_until(|| d.queue().delivery().is_empty() && d.queue().delivery().processing_len() == 0)
        .await;
    token.cancel();
    runner.await.unwrap();

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(handled.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn dispatcher_events_reach_subscribers() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler: HandlerRef = {
        let calls = calls.clone();
        HandlerFn::arc("flaky", move |_ctx: CancellationToken, _key: ObjectKey| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HandlerError::fail("first try"))
                } else {
                    Ok(())
                }
            }
        })
    };

    let bus = Bus::new(64);
    let collect = Arc::new(Collect::default());
    let subs = Arc::new(SubscriberSet::new(vec![collect.clone() as Arc<dyn Subscribe>]));
    let token = CancellationToken::new();
    let listener = subs.clone().listen(&bus, token.clone());

    let d = Arc::new(Dispatcher::new("pods", handler, fast_retry(3), Some(bus)));
    d.enqueue("default/web");
    d.enqueue("not/a/key");
    let runner = tokio::spawn(d.clone().run(token.clone(), 1));

    wait_until(|| {
        let kinds = collect.kinds.lock().unwrap();
        kinds.contains(&EventKind::ItemProcessed) && kinds.contains(&EventKind::ItemInvalid)
    })
    .await;

    token.cancel();
    runner.await.unwrap();
    listener.await.unwrap();

    let kinds = collect.kinds.lock().unwrap().clone();
    assert!(kinds.contains(&EventKind::ItemRequeued));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn probe_results_flow_through_subscription() {
    let n = Arc::new(AtomicU32::new(0));
    let prober = {
        let n = n.clone();
        ProbeFn::arc("alternating", move |_ctx: CancellationToken| {
            let n = n.clone();
            async move {
                if n.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Ok(())
                } else {
                    Err(ProviderError::Fail {
                        reason: "disk pressure".into(),
                    })
                }
            }
        })
    };
    let c = Arc::new(
        NodeProbeController::new(
            prober,
            ProbeConfig::new(Duration::from_millis(10), Some(Duration::from_millis(100))).unwrap(),
        )
        .unwrap(),
    );
    let token = CancellationToken::new();
    let mut sub = c.subscribe();
    let runner = {
        let c = c.clone();
        let token = token.clone();
        tokio::spawn(async move { c.run(token).await })
    };

    let first = sub.changed(&token).await.unwrap();
    let second = sub.changed(&token).await.unwrap();
    assert!(second.generation > first.generation);

    let healthy = [&first, &second].iter().filter(|v| v.value.is_healthy()).count();
    assert!(healthy >= 1 || n.load(Ordering::SeqCst) > 2);

    token.cancel();
    runner.await.unwrap();

    let latest = c.latest_result(&CancellationToken::new()).await.unwrap();
    if let Some(err) = latest.error {
        assert!(matches!(err, ProbeError::Provider { .. } | ProbeError::Canceled));
    }
}

#[tokio::test]
async fn keyed_queue_delivers_latest_after_concurrent_update() {
    let q: KeySerializingQueue<u32> = KeySerializingQueue::new();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let token = CancellationToken::new();

    q.enqueue("ns/pod", 1);
    let worker = {
        let q2 = q.clone();
        let q3 = q.clone();
        let delivered = delivered.clone();
        let token = token.clone();
        tokio::spawn(async move {
            q2.run_worker(token, move |p| {
                let delivered = delivered.clone();
                let q3 = q3.clone();
                async move {
                    delivered.lock().unwrap().push(p);
                    if p == 1 {
                        // A newer payload arrives while the first is being pushed.
                        q3.enqueue("ns/pod", 2);
                        q3.enqueue("ns/pod", 3);
                        return false;
                    }
                    true
                }
            })
            .await
        })
    };

    wait_until(|| delivered.lock().unwrap().len() == 2).await;
    q.stop();
    worker.await.unwrap();

    assert_eq!(*delivered.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn broadcast_cell_wakes_all_waiters_once_per_publish() {
    let cell: BroadcastCell<&'static str> = BroadcastCell::new();
    let token = CancellationToken::new();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let cell = cell.clone();
        let token = token.clone();
        waiters.push(tokio::spawn(async move { cell.wait_first(&token).await }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cell.set("ready"), 1);

    for w in waiters {
        let got = w.await.unwrap().unwrap();
        assert_eq!(got.value, "ready");
        assert_eq!(got.generation, 1);
    }
}
