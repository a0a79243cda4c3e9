//! Race fan-in: first error wins.

use super::{errors_observed, normal, recurse, Recorder, Scripted, LABELS};
use std::time::{Duration, Instant};
use tower::{Layer, Service, ServiceExt};
use tower_fanout::{DispatcherLayer, Request, DEFAULT_MAX_DEPTH};

#[tokio::test]
async fn test_first_error_resolves_before_slow_siblings() {
    let dependency = Scripted::new(|req| (req.dependency == "C").then(|| normal(req)))
        .with_latency(Duration::from_millis(400));
    let log = dependency.log();

    let mut dispatcher = DispatcherLayer::builder()
        .race()
        .dependencies(LABELS)
        .build()
        .layer(dependency);

    let start = Instant::now();
    let err = dispatcher
        .ready()
        .await
        .unwrap()
        .call(Request::new(1))
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_millis(200));
    assert!(err.is_aborted());
    assert_eq!(err.dependency(), "C");

    // Every slot was started; none of the slow ones ran to completion
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.len(), 4);
    assert_eq!(log.completed(), 0);
}

#[tokio::test]
async fn test_acts_on_exactly_one_of_several_errors() {
    let dependency = Scripted::new(|req| (req.dependency != "D").then(|| normal(req)))
        .with_latency(Duration::from_millis(200));
    let recorder = Recorder::default();

    let dispatcher = DispatcherLayer::builder()
        .race()
        .dependencies(LABELS)
        .on_event(recorder.clone())
        .build()
        .layer(dependency);

    let err = dispatcher.dispatch(Request::new(2)).await.unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(errors_observed(&recorder.events()), 1);
}

#[tokio::test]
async fn test_error_buffered_before_done_still_wins() {
    // A single instant failure races the done signal on every run
    for id in 0..50 {
        let dispatcher = DispatcherLayer::builder()
            .race()
            .dependencies(["only"])
            .build()
            .layer(Scripted::new(|req| Some(normal(req))));

        let result = dispatcher.dispatch(Request::new(id)).await;
        assert!(result.unwrap_err().is_aborted(), "run {} lost its error", id);
    }
}

#[tokio::test]
async fn test_retries_at_next_depth_with_same_request_id() {
    let dependency =
        Scripted::new(|req| (req.dependency == "B" && req.depth < 2).then(|| recurse(req)));
    let log = dependency.log();

    let dispatcher = DispatcherLayer::builder()
        .race()
        .dependencies(LABELS)
        .build()
        .layer(dependency);

    let report = dispatcher.dispatch(Request::new(9)).await.unwrap();

    assert_eq!(report.request_id, 9);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.max_depth_reached, 2);
    assert!(report.retried());
    assert!(log.calls().iter().all(|(id, _, _)| *id == 9));
    for depth in 0..=2 {
        assert_eq!(log.at_depth(depth), 4);
    }
}

#[tokio::test]
async fn test_recurse_at_max_depth_exhausts_retries() {
    let dispatcher = DispatcherLayer::builder()
        .race()
        .dependencies(["A", "B"])
        .max_depth(3)
        .build()
        .layer(Scripted::new(|req| Some(recurse(req))));

    let err = dispatcher.dispatch(Request::new(4)).await.unwrap_err();

    assert!(err.is_retries_exhausted());
    assert_eq!(err.depth(), 3);
    assert_eq!(err.request_id(), 4);
}

#[tokio::test]
async fn test_default_depth_cap() {
    let dispatcher = DispatcherLayer::builder()
        .race()
        .build()
        .layer(Scripted::new(|req| Some(recurse(req))));

    let err = dispatcher.dispatch(Request::new(1)).await.unwrap_err();

    assert!(err.is_retries_exhausted());
    assert_eq!(err.depth(), DEFAULT_MAX_DEPTH);
}

#[tokio::test]
async fn test_unlimited_depth_retries_past_default_cap() {
    let deepest = DEFAULT_MAX_DEPTH + 5;
    let dispatcher = DispatcherLayer::builder()
        .race()
        .unlimited_depth()
        .build()
        .layer(Scripted::new(move |req| {
            (req.dependency == "SA" && req.depth < deepest).then(|| recurse(req))
        }));

    let report = dispatcher.dispatch(Request::new(1)).await.unwrap();

    assert_eq!(report.max_depth_reached, deepest);
    assert_eq!(report.attempts, deepest as usize + 1);
}

#[tokio::test]
async fn test_normal_error_after_retry_aborts_at_that_depth() {
    let dependency = Scripted::new(|req| match (req.depth, req.dependency.as_str()) {
        (0, "A") => Some(recurse(req)),
        (1, "D") => Some(normal(req)),
        _ => None,
    });

    let dispatcher = DispatcherLayer::builder()
        .race()
        .dependencies(LABELS)
        .build()
        .layer(dependency);

    let err = dispatcher.dispatch(Request::new(6)).await.unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(err.depth(), 1);
    assert_eq!(err.dependency(), "D");
    assert_eq!(err.to_string(), "request 6 aborted at depth 1 by D: 1 D: NORMAL ERROR");
}
