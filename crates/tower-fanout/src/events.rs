//! Events emitted by the fan-out dispatcher.

use crate::config::FanInStrategy;
use crate::request::DependencyName;
use std::time::{Duration, Instant};
use tower_fanout_core::{FailureKind, FanoutEvent};

/// What the dispatcher did about an observed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Fanned out again at the next depth.
    Recurse,
    /// Stopped handling the attempt.
    Return,
}

/// Events emitted during a dispatch.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// An attempt fanned out to its dependencies.
    AttemptStarted {
        /// Name of the dispatcher instance.
        name: String,
        /// Fan-in strategy in use.
        strategy: FanInStrategy,
        /// ID of the request.
        request_id: u64,
        /// Depth of the attempt.
        depth: u32,
        /// Number of dependency calls started.
        fan_out: usize,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// A dependency call succeeded.
    ///
    /// Calls abandoned by an early resolution may still report here after
    /// their attempt has resolved, unless they were cancelled.
    DependencySucceeded {
        /// Name of the dispatcher instance.
        name: String,
        /// ID of the request.
        request_id: u64,
        /// Depth of the attempt.
        depth: u32,
        /// Dependency that succeeded.
        dependency: DependencyName,
        /// Time the call took.
        elapsed: Duration,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// The dispatcher observed and classified a dependency error.
    ErrorObserved {
        /// Name of the dispatcher instance.
        name: String,
        /// ID of the request.
        request_id: u64,
        /// Depth of the attempt.
        depth: u32,
        /// Dependency that failed.
        dependency: DependencyName,
        /// Classification of the error.
        kind: FailureKind,
        /// What the dispatcher did about it.
        action: ErrorAction,
        /// Rendered error message.
        message: String,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// An attempt resolved.
    AttemptResolved {
        /// Name of the dispatcher instance.
        name: String,
        /// ID of the request.
        request_id: u64,
        /// Depth of the attempt.
        depth: u32,
        /// Whether the request can still succeed through this attempt.
        ///
        /// The two strategies resolve attempts at different moments. Race
        /// resolves an attempt as soon as it acts on an error, so an attempt
        /// that retried reports `false` and its retry reports separately.
        /// Drain resolves an attempt only after every retry chain it started
        /// has resolved, so an attempt whose `Recurse` errors were all
        /// retried successfully reports `true`.
        succeeded: bool,
        /// Errors observed by this attempt.
        errors_observed: usize,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// A retry was refused because the attempt was already at the maximum depth.
    RetriesExhausted {
        /// Name of the dispatcher instance.
        name: String,
        /// ID of the request.
        request_id: u64,
        /// Configured maximum depth.
        max_depth: u32,
        /// When this event occurred.
        timestamp: Instant,
    },
}

impl FanoutEvent for DispatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::AttemptStarted { .. } => "attempt_started",
            DispatchEvent::DependencySucceeded { .. } => "dependency_succeeded",
            DispatchEvent::ErrorObserved { .. } => "error_observed",
            DispatchEvent::AttemptResolved { .. } => "attempt_resolved",
            DispatchEvent::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            DispatchEvent::AttemptStarted { timestamp, .. }
            | DispatchEvent::DependencySucceeded { timestamp, .. }
            | DispatchEvent::ErrorObserved { timestamp, .. }
            | DispatchEvent::AttemptResolved { timestamp, .. }
            | DispatchEvent::RetriesExhausted { timestamp, .. } => *timestamp,
        }
    }

    fn dispatcher_name(&self) -> &str {
        match self {
            DispatchEvent::AttemptStarted { name, .. }
            | DispatchEvent::DependencySucceeded { name, .. }
            | DispatchEvent::ErrorObserved { name, .. }
            | DispatchEvent::AttemptResolved { name, .. }
            | DispatchEvent::RetriesExhausted { name, .. } => name,
        }
    }

    fn request_id(&self) -> u64 {
        match self {
            DispatchEvent::AttemptStarted { request_id, .. }
            | DispatchEvent::DependencySucceeded { request_id, .. }
            | DispatchEvent::ErrorObserved { request_id, .. }
            | DispatchEvent::AttemptResolved { request_id, .. }
            | DispatchEvent::RetriesExhausted { request_id, .. } => *request_id,
        }
    }
}
