//! One attempt: the fan-out itself and the events both strategies share.
//!
//! [`fan_out()`] spawns one task per dependency plus a closer task. Every
//! dependency task owns its result and sends a failure, if any, on the
//! attempt's error channel. The closer joins all of them, then closes the
//! channel and fires the done signal, so neither can happen while a call is
//! still running.
//!
//! A call that panics is caught inside its task and reported as a failure
//! like any other, so a panic can never pass for a success.

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::events::{DispatchEvent, ErrorAction};
use crate::outcome::{Failure, Fault};
use crate::request::DependencyRequest;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tower::{Service, ServiceExt};
use tower_fanout_core::{Classify, FailureKind};

/// A running fan-out.
pub(crate) struct Attempt<E> {
    pub(crate) depth: u32,
    /// Failures in arrival order; closed once every call has finished.
    pub(crate) errors: mpsc::Receiver<Failure<E>>,
    /// Fires once every call has finished, whatever the outcomes.
    pub(crate) done: oneshot::Receiver<()>,
    /// Cancels the calls when the attempt is dropped, including when the
    /// dispatch future itself is dropped. `None` with cancellation disabled.
    cancel_on_drop: Option<DropGuard>,
}

impl<E> Attempt<E> {
    /// Stop caring about calls that are still running.
    ///
    /// With cancellation enabled the calls are told to stop; otherwise they
    /// run to completion and their failures go nowhere.
    pub(crate) fn abandon(&mut self) {
        if let Some(guard) = self.cancel_on_drop.take() {
            guard.disarm().cancel();
        }
    }

    /// Every call has finished; dropping the attempt has nothing to cancel.
    pub(crate) fn complete(&mut self) {
        if let Some(guard) = self.cancel_on_drop.take() {
            guard.disarm();
        }
    }
}

/// Start one attempt: a call to every configured dependency at `depth`.
pub(crate) fn fan_out<S>(
    service: &S,
    config: &Arc<DispatcherConfig>,
    request_id: u64,
    depth: u32,
) -> Attempt<S::Error>
where
    S: Service<DependencyRequest, Response = Duration> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send,
{
    let fan_out = config.dependencies.len();

    config.listeners.emit(&DispatchEvent::AttemptStarted {
        name: config.name.clone(),
        strategy: config.strategy,
        request_id,
        depth,
        fan_out,
        timestamp: Instant::now(),
    });

    #[cfg(feature = "tracing")]
    tracing::debug!(
        dispatcher = %config.name,
        strategy = %config.strategy,
        request_id,
        depth,
        fan_out,
        "fanning out"
    );

    let cancel = CancellationToken::new();
    // Room for every call's failure, so no call ever waits on the dispatcher
    let (errors_tx, errors_rx) = mpsc::channel(fan_out.max(1));
    let (done_tx, done_rx) = oneshot::channel();

    let calls: Vec<_> = config
        .dependencies
        .iter()
        .map(|dependency| {
            let req = DependencyRequest {
                request_id,
                depth,
                dependency: dependency.clone(),
                cancel: cancel.clone(),
            };
            tokio::spawn(call_dependency(
                service.clone(),
                req,
                errors_tx.clone(),
                Arc::clone(config),
            ))
        })
        .collect();

    tokio::spawn(async move {
        // Calls catch their own panics; a join error here means the runtime
        // is shutting down and nobody is waiting for the attempt anyway
        let _ = futures::future::join_all(calls).await;
        drop(errors_tx);
        let _ = done_tx.send(());
    });

    Attempt {
        depth,
        errors: errors_rx,
        done: done_rx,
        cancel_on_drop: config.cancel_abandoned.then(|| cancel.drop_guard()),
    }
}

async fn call_dependency<S>(
    mut service: S,
    req: DependencyRequest,
    errors: mpsc::Sender<Failure<S::Error>>,
    config: Arc<DispatcherConfig>,
) where
    S: Service<DependencyRequest, Response = Duration>,
{
    let dependency = req.dependency.clone();
    let request_id = req.request_id;
    let depth = req.depth;

    let call = async move { service.ready().await?.call(req).await };

    let fault = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(elapsed)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                dispatcher = %config.name,
                request_id,
                "{} {}: success in {:?}",
                depth,
                dependency,
                elapsed
            );

            config.listeners.emit(&DispatchEvent::DependencySucceeded {
                name: config.name.clone(),
                request_id,
                depth,
                dependency,
                elapsed,
                timestamp: Instant::now(),
            });
            return;
        }
        Ok(Err(error)) => Fault::Error(error),
        Err(_panic) => {
            #[cfg(feature = "tracing")]
            tracing::error!(
                dispatcher = %config.name,
                request_id,
                "{} {}: call panicked",
                depth,
                dependency
            );
            Fault::Panicked
        }
    };

    // The dispatcher may have stopped listening; nobody wants this then
    let _ = errors
        .send(Failure {
            dependency,
            depth,
            fault,
        })
        .await;
}

/// Report an error the dispatcher is acting on.
pub(crate) fn observe_error<E>(
    config: &DispatcherConfig,
    request_id: u64,
    failure: &Failure<E>,
    action: ErrorAction,
) where
    E: Classify + fmt::Display,
{
    let message = match &failure.fault {
        Fault::Error(error) => error.to_string(),
        Fault::Panicked => format!("{} {}: panicked", failure.depth, failure.dependency),
    };

    #[cfg(feature = "tracing")]
    match action {
        ErrorAction::Recurse => tracing::info!(
            dispatcher = %config.name,
            request_id,
            depth = failure.depth,
            dependency = %failure.dependency,
            "{} - recurse",
            message
        ),
        ErrorAction::Return => tracing::warn!(
            dispatcher = %config.name,
            request_id,
            depth = failure.depth,
            dependency = %failure.dependency,
            "{} - return",
            message
        ),
    }

    config.listeners.emit(&DispatchEvent::ErrorObserved {
        name: config.name.clone(),
        request_id,
        depth: failure.depth,
        dependency: failure.dependency.clone(),
        kind: failure.fault.kind(),
        action,
        message,
        timestamp: Instant::now(),
    });
}

/// Report that an attempt has resolved.
pub(crate) fn resolve_attempt(
    config: &DispatcherConfig,
    request_id: u64,
    depth: u32,
    succeeded: bool,
    errors_observed: usize,
) {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        dispatcher = %config.name,
        request_id,
        depth,
        succeeded,
        errors_observed,
        "attempt resolved"
    );

    config.listeners.emit(&DispatchEvent::AttemptResolved {
        name: config.name.clone(),
        request_id,
        depth,
        succeeded,
        errors_observed,
        timestamp: Instant::now(),
    });
}

/// Turn a failure the dispatcher will not retry into the terminal error.
///
/// `Recurse` failures only end up here when the depth cap refused them.
pub(crate) fn terminal<E>(
    config: &DispatcherConfig,
    request_id: u64,
    failure: Failure<E>,
) -> DispatchError<E>
where
    E: Classify,
{
    let Failure {
        dependency,
        depth,
        fault,
    } = failure;

    let error = match fault {
        Fault::Error(error) => error,
        Fault::Panicked => {
            return DispatchError::Panicked {
                request_id,
                depth,
                dependency,
            }
        }
    };

    match error.kind() {
        FailureKind::Recurse => {
            let max_depth = config.max_depth.unwrap_or(depth);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                dispatcher = %config.name,
                request_id,
                max_depth,
                "retries exhausted"
            );

            config.listeners.emit(&DispatchEvent::RetriesExhausted {
                name: config.name.clone(),
                request_id,
                max_depth,
                timestamp: Instant::now(),
            });

            DispatchError::RetriesExhausted {
                request_id,
                depth,
                dependency,
                source: error,
            }
        }
        FailureKind::Normal => DispatchError::Aborted {
            request_id,
            depth,
            dependency,
            source: error,
        },
    }
}
