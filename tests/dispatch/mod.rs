//! Tests for the fan-out dispatcher, organized into:
//!
//! - **race**: first-error-wins fan-in
//! - **drain**: wait-for-all fan-in and its per-error retry chains
//! - **properties**: the behavioral guarantees both strategies share or contrast on
//! - **events**: event emission and listeners
//! - **cancellation**: what happens to calls an attempt stops waiting for

mod race;

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;
use tower_fanout::{DependencyError, DependencyRequest, DispatchEvent};
use tower_fanout_core::EventListener;

pub const LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// One started call: `(request_id, depth, label)`.
pub type Call = (u64, u32, String);

/// Shared record of what a [`Scripted`] dependency was asked to do.
#[derive(Clone, Default)]
pub struct CallLog {
    started: Arc<Mutex<Vec<Call>>>,
    completed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.started.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn at_depth(&self, depth: u32) -> usize {
        self.calls().iter().filter(|(_, d, _)| *d == depth).count()
    }

    /// Successful calls that ran their full latency.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

type Outcome = dyn Fn(&DependencyRequest) -> Option<DependencyError> + Send + Sync;
type Latency = dyn Fn(&DependencyRequest) -> Duration + Send + Sync;

/// Deterministic dependency stub.
///
/// Failing calls return at once; successful calls wait out their latency,
/// stopping early if the attempt's token is cancelled.
#[derive(Clone)]
pub struct Scripted {
    log: CallLog,
    outcome: Arc<Outcome>,
    latency: Arc<Latency>,
}

impl Scripted {
    pub fn new<F>(outcome: F) -> Self
    where
        F: Fn(&DependencyRequest) -> Option<DependencyError> + Send + Sync + 'static,
    {
        Self {
            log: CallLog::default(),
            outcome: Arc::new(outcome),
            latency: Arc::new(|_| Duration::ZERO),
        }
    }

    pub fn always_succeed() -> Self {
        Self::new(|_| None)
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_fn(move |_| latency)
    }

    pub fn with_latency_fn<F>(mut self, latency: F) -> Self
    where
        F: Fn(&DependencyRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Arc::new(latency);
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Service<DependencyRequest> for Scripted {
    type Response = Duration;
    type Error = DependencyError;
    type Future = BoxFuture<'static, Result<Duration, DependencyError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DependencyRequest) -> Self::Future {
        self.log.started.lock().unwrap().push((
            req.request_id,
            req.depth,
            req.dependency.to_string(),
        ));

        let failure = (self.outcome)(&req);
        let latency = (self.latency)(&req);
        let log = self.log.clone();

        Box::pin(async move {
            if let Some(error) = failure {
                return Err(error);
            }

            tokio::select! {
                biased;

                _ = req.cancel.cancelled() => {
                    log.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(DependencyError::Cancelled { cause: req.call_site() })
                }
                _ = tokio::time::sleep(latency) => {
                    log.completed.fetch_add(1, Ordering::SeqCst);
                    Ok(latency)
                }
            }
        })
    }
}

pub fn recurse(req: &DependencyRequest) -> DependencyError {
    DependencyError::Recurse {
        cause: req.call_site(),
    }
}

pub fn normal(req: &DependencyRequest) -> DependencyError {
    DependencyError::Normal {
        cause: req.call_site(),
    }
}

/// Listener that keeps every event it sees.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<DispatchEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventListener<DispatchEvent> for Recorder {
    fn on_event(&self, event: &DispatchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn errors_observed(events: &[DispatchEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, DispatchEvent::ErrorObserved { .. }))
        .count()
}

pub fn attempts_started(events: &[DispatchEvent]) -> Vec<(u64, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            DispatchEvent::AttemptStarted {
                request_id, depth, ..
            } => Some((*request_id, *depth)),
            _ => None,
        })
        .collect()
}
