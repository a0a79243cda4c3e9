//! Fan-out dispatch middleware for Tower services.
//!
//! A [`Dispatcher`] takes one incoming [`Request`] and calls every configured
//! dependency concurrently, one task per dependency. How it combines the
//! outcomes (the fan-in) and what it does about failures is the point of the
//! crate.
//!
//! # Failure kinds
//!
//! Dependency errors classify themselves through
//! [`Classify`](tower_fanout_core::Classify):
//!
//! - **Recurse**: transient. The request is fanned out again at `depth + 1`.
//! - **Normal**: terminal. The request is aborted.
//!
//! Retries stop at a configurable maximum depth, after which a `Recurse`
//! failure resolves the request as [`DispatchError::RetriesExhausted`].
//! A call that panics is handled like a `Normal` failure and resolves the
//! request as [`DispatchError::Panicked`].
//!
//! # Fan-in strategies
//!
//! ## Race
//!
//! Resolve an attempt as soon as either every call has succeeded or the first
//! error arrives. Only one error per attempt is ever acted on; the calls still
//! running are abandoned.
//!
//! ## Drain
//!
//! Wait for every call of an attempt and act on every error in arrival order.
//! Every `Recurse` error starts its own retry chain; a `Normal` error aborts
//! the attempt immediately.
//!
//! # Example
//!
//! ```rust
//! use tower::{Layer, Service, ServiceExt};
//! use tower_fanout::{DependencyError, DependencyRequest, DispatcherLayer, Request};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dependency = tower::service_fn(|req: DependencyRequest| async move {
//!     if req.dependency == "SB" && req.depth == 0 {
//!         return Err(DependencyError::Recurse { cause: req.call_site() });
//!     }
//!     Ok(Duration::from_millis(5))
//! });
//!
//! let mut dispatcher = DispatcherLayer::builder()
//!     .race()
//!     .max_depth(3)
//!     .build()
//!     .layer(dependency);
//!
//! let report = dispatcher.ready().await?.call(Request::new(1)).await?;
//! assert_eq!(report.attempts, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Each attempt hands its calls a shared
//! [`CancellationToken`](tokio_util::sync::CancellationToken). When an attempt
//! resolves while calls are still running, the token is cancelled unless
//! [`cancel_abandoned(false)`](DispatcherConfigBuilder::cancel_abandoned) was
//! set, in which case those calls run to completion and their results are
//! dropped.

mod attempt;
mod config;
mod drain;
mod error;
mod events;
mod layer;
mod outcome;
mod race;
mod request;
mod simulated;

pub use config::{
    DispatcherConfig, DispatcherConfigBuilder, FanInStrategy, DEFAULT_DEPENDENCIES,
    DEFAULT_MAX_DEPTH,
};
pub use error::{DependencyError, DispatchError};
pub use events::{DispatchEvent, ErrorAction};
pub use layer::DispatcherLayer;
pub use outcome::Dispatched;
pub use request::{DependencyName, DependencyRequest, Request};
pub use simulated::{
    SimulatedDependency, SimulatedDependencyBuilder, DEFAULT_ERROR_INTERVAL, DEFAULT_MAX_LATENCY,
    DEFAULT_RECURSE_INTERVAL,
};

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;
use tower_fanout_core::Classify;

/// Fan-out dispatcher service wrapping a dependency service.
///
/// Every attempt clones the dependency service once per configured
/// dependency and drives each clone to readiness on its own task.
pub struct Dispatcher<S> {
    inner: S,
    config: Arc<DispatcherConfig>,
}

impl<S> Dispatcher<S> {
    /// Create a new Dispatcher with the given configuration.
    pub fn new(inner: S, config: Arc<DispatcherConfig>) -> Self {
        Self { inner, config }
    }

    /// The fan-in strategy this dispatcher uses.
    pub fn strategy(&self) -> FanInStrategy {
        self.config.strategy
    }
}

impl<S: Clone> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> Dispatcher<S>
where
    S: Service<DependencyRequest, Response = Duration> + Clone + Send + 'static,
    S::Error: Classify + fmt::Display + Send + 'static,
    S::Future: Send,
{
    /// Dispatch `request`, starting at `request.depth`, until it resolves.
    pub fn dispatch(
        &self,
        request: Request,
    ) -> BoxFuture<'static, Result<Dispatched, DispatchError<S::Error>>> {
        let service = self.inner.clone();
        let config = Arc::clone(&self.config);

        match config.strategy {
            FanInStrategy::Race => Box::pin(race::dispatch(service, config, request)),
            FanInStrategy::Drain => Box::pin(drain::dispatch(service, config, request)),
        }
    }
}

impl<S> Service<Request> for Dispatcher<S>
where
    S: Service<DependencyRequest, Response = Duration> + Clone + Send + 'static,
    S::Error: Classify + fmt::Display + Send + 'static,
    S::Future: Send,
{
    type Response = Dispatched;
    type Error = DispatchError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Each fan-out slot readies its own clone of the dependency
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        self.dispatch(req)
    }
}
