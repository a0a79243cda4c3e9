//! Dispatcher stress tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tower::{Layer, Service, ServiceExt};
use tower_fanout::{
    DependencyError, DependencyRequest, DispatcherLayer, FanInStrategy, Request,
    SimulatedDependency,
};

use super::ConcurrencyTracker;

const STRATEGIES: [FanInStrategy; 2] = [FanInStrategy::Race, FanInStrategy::Drain];

/// Test: High volume of sequential requests with an instant dependency
#[tokio::test]
#[ignore]
async fn stress_high_volume_sequential() {
    for strategy in STRATEGIES {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&call_count);

        let svc = tower::service_fn(move |_req: DependencyRequest| {
            counter.fetch_add(1, Ordering::Relaxed);
            async move { Ok::<_, DependencyError>(Duration::ZERO) }
        });

        let mut service = DispatcherLayer::builder()
            .strategy(strategy)
            .build()
            .layer(svc);

        let start = Instant::now();

        for id in 0..50_000 {
            let result = service.ready().await.unwrap().call(Request::new(id)).await;
            assert!(result.is_ok());
        }

        let elapsed = start.elapsed();
        println!("{}: 50k dispatches completed in {:?}", strategy, elapsed);
        println!(
            "Throughput: {:.0} dispatches/sec",
            50_000.0 / elapsed.as_secs_f64()
        );

        assert_eq!(call_count.load(Ordering::Relaxed), 200_000);
    }
}

/// Test: Many concurrent requests against the simulated dependency
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_concurrent_simulated_requests() {
    for strategy in STRATEGIES {
        let dependency = SimulatedDependency::builder()
            .max_latency(Duration::from_millis(20))
            .seed(17)
            .build();

        let service = DispatcherLayer::builder()
            .strategy(strategy)
            .build()
            .layer(dependency);

        let start = Instant::now();

        let handles: Vec<_> = (0..2_000)
            .map(|id| {
                let svc = service.clone();
                tokio::spawn(async move { svc.dispatch(Request::new(id)).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut aborted = 0;
        let mut exhausted = 0;
        for handle in handles {
            match tokio::time::timeout(Duration::from_secs(30), handle)
                .await
                .expect("dispatch hung")
                .unwrap()
            {
                Ok(_) => succeeded += 1,
                Err(e) if e.is_retries_exhausted() => exhausted += 1,
                Err(_) => aborted += 1,
            }
        }

        println!(
            "{}: 2000 concurrent dispatches in {:?} ({} ok, {} aborted, {} exhausted)",
            strategy,
            start.elapsed(),
            succeeded,
            aborted,
            exhausted
        );

        assert_eq!(succeeded + aborted + exhausted, 2_000);
        assert!(succeeded > 0);
    }
}

/// Test: Hundreds of dependencies per attempt all run concurrently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_wide_fan_out() {
    for strategy in STRATEGIES {
        let tracker = ConcurrencyTracker::new();
        let t = Arc::clone(&tracker);

        let svc = tower::service_fn(move |_req: DependencyRequest| {
            let t = Arc::clone(&t);
            async move {
                let _in_flight = t.enter();
                sleep(Duration::from_millis(50)).await;
                Ok::<_, DependencyError>(Duration::from_millis(50))
            }
        });

        let labels: Vec<String> = (0..512).map(|i| format!("dep-{}", i)).collect();
        let service = DispatcherLayer::builder()
            .strategy(strategy)
            .dependencies(labels)
            .build()
            .layer(svc);

        let start = Instant::now();
        service.dispatch(Request::new(1)).await.unwrap();
        let elapsed = start.elapsed();

        println!(
            "{}: 512-wide fan-out in {:?}, peak concurrency {}",
            strategy,
            elapsed,
            tracker.peak()
        );

        assert!(tracker.peak() >= 256);
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(tracker.current(), 0);
    }
}

/// Test: Abandoned calls are cancelled and never accumulate
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_abandoned_calls_do_not_accumulate() {
    let tracker = ConcurrencyTracker::new();
    let t = Arc::clone(&tracker);

    // SB fails at once; the other three would otherwise sleep for a minute
    let svc = tower::service_fn(move |req: DependencyRequest| {
        let t = Arc::clone(&t);
        async move {
            if req.dependency == "SB" {
                return Err(DependencyError::Normal {
                    cause: req.call_site(),
                });
            }
            let _in_flight = t.enter();
            tokio::select! {
                _ = req.cancel.cancelled() => Err(DependencyError::Cancelled {
                    cause: req.call_site(),
                }),
                _ = sleep(Duration::from_secs(60)) => Ok(Duration::from_secs(60)),
            }
        }
    });

    let mut service = DispatcherLayer::builder().race().build().layer(svc);

    for id in 0..10_000 {
        let result = service.ready().await.unwrap().call(Request::new(id)).await;
        assert!(result.unwrap_err().is_aborted());
    }

    sleep(Duration::from_millis(200)).await;

    println!(
        "10k aborted dispatches, peak abandoned calls in flight: {}",
        tracker.peak()
    );
    assert_eq!(tracker.current(), 0);
}
