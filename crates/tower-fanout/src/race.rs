//! Race fan-in: resolve on the first error or once every call has succeeded.
//!
//! Each attempt waits on two things at once: the done signal from the
//! attempt's closer task and the error channel. Whichever is ready first
//! decides the attempt. On an error the remaining calls are not awaited; they
//! are cancelled (or left to finish unobserved, if cancellation is disabled).
//!
//! Retries are a loop, not recursion: a `Recurse` error starts the next
//! attempt at `depth + 1` until the configured maximum depth is reached.

use crate::attempt::{fan_out, observe_error, resolve_attempt, terminal};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::events::ErrorAction;
use crate::outcome::Dispatched;
use crate::request::{DependencyRequest, Request};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tower::Service;
use tower_fanout_core::{Classify, FailureKind};

pub(crate) async fn dispatch<S>(
    service: S,
    config: Arc<DispatcherConfig>,
    request: Request,
) -> Result<Dispatched, DispatchError<S::Error>>
where
    S: Service<DependencyRequest, Response = Duration> + Clone + Send + 'static,
    S::Error: Classify + fmt::Display + Send + 'static,
    S::Future: Send,
{
    let mut report = Dispatched::new(request.id, request.depth);
    let mut depth = request.depth;

    loop {
        let mut attempt = fan_out(&service, &config, request.id, depth);
        report.record_attempt(depth);

        let first_error = tokio::select! {
            biased;

            Some(failure) = attempt.errors.recv() => Some(failure),

            // The closer fires only after every call has finished, so any
            // failure sent before that is already buffered
            _ = &mut attempt.done => attempt.errors.try_recv().ok(),
        };

        let Some(failure) = first_error else {
            attempt.complete();
            resolve_attempt(&config, request.id, depth, true, 0);
            return Ok(report);
        };

        report.errors_observed += 1;
        attempt.abandon();

        let retry = failure.fault.kind() == FailureKind::Recurse && config.can_retry_from(depth);
        let action = if retry {
            ErrorAction::Recurse
        } else {
            ErrorAction::Return
        };
        observe_error(&config, request.id, &failure, action);
        resolve_attempt(&config, request.id, depth, false, 1);

        if !retry {
            return Err(terminal(&config, request.id, failure));
        }
        depth += 1;
    }
}
