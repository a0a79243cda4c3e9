//! Drain fan-in: wait for every call and act on every error it reports.
//!
//! The error channel of an attempt closes only after all of its calls have
//! finished, so draining it to the end observes every failure in arrival
//! order. Each `Recurse` failure starts a full retry chain at `depth + 1`;
//! once that chain resolves, draining of the parent attempt resumes. Two
//! `Recurse` failures in one attempt therefore start two independent chains,
//! unlike the race strategy, which only ever acts on one error per attempt.
//!
//! A `Normal` failure (or a `Recurse` failure at the maximum depth) resolves
//! the attempt on the spot and abandons whatever is left in its channel.
//!
//! Retry chains are tracked on an explicit stack of suspended parent
//! attempts rather than through recursive calls.

use crate::attempt::{fan_out, observe_error, resolve_attempt, terminal, Attempt};
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

struct Frame<E> {
    attempt: Attempt<E>,
    errors_observed: usize,
    /// First terminal failure among the retry chains this attempt started.
    chain_failure: Option<DispatchError<E>>,
}

impl<E> Frame<E> {
    fn new(attempt: Attempt<E>) -> Self {
        Self {
            attempt,
            errors_observed: 0,
            chain_failure: None,
        }
    }
}

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
    let mut parents: Vec<Frame<S::Error>> = Vec::new();

    report.record_attempt(request.depth);
    let mut current = Frame::new(fan_out(&service, &config, request.id, request.depth));

    loop {
        let depth = current.attempt.depth;
        let next = current.attempt.errors.recv().await;

        let outcome = match next {
            // Every call has finished and every failure has been handled
            None => {
                current.attempt.complete();
                match current.chain_failure.take() {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Some(failure) => {
                current.errors_observed += 1;
                report.errors_observed += 1;

                if failure.fault.kind() == FailureKind::Recurse && config.can_retry_from(depth) {
                    observe_error(&config, request.id, &failure, ErrorAction::Recurse);

                    report.record_attempt(depth + 1);
                    let child = Frame::new(fan_out(&service, &config, request.id, depth + 1));
                    parents.push(std::mem::replace(&mut current, child));
                    continue;
                }

                observe_error(&config, request.id, &failure, ErrorAction::Return);
                current.attempt.abandon();
                Err(terminal(&config, request.id, failure))
            }
        };

        resolve_attempt(
            &config,
            request.id,
            depth,
            outcome.is_ok(),
            current.errors_observed,
        );

        match parents.pop() {
            Some(parent) => {
                current = parent;
                if let Err(err) = outcome {
                    if current.chain_failure.is_none() {
                        current.chain_failure = Some(err);
                    }
                }
            }
            None => return outcome.map(|()| report),
        }
    }
}
