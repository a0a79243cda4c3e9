//! Per-call failures and the successful dispatch report.

use crate::request::DependencyName;
use tower_fanout_core::{Classify, FailureKind};

/// Why a dependency call failed.
#[derive(Debug)]
pub(crate) enum Fault<E> {
    /// The dependency returned an error.
    Error(E),
    /// The call panicked before producing a result.
    Panicked,
}

impl<E: Classify> Fault<E> {
    /// A panic is terminal: nothing says a retry would not panic too.
    pub(crate) fn kind(&self) -> FailureKind {
        match self {
            Fault::Error(error) => error.kind(),
            Fault::Panicked => FailureKind::Normal,
        }
    }
}

/// A failed dependency call, tagged with where it happened.
///
/// Each fan-out task owns its failure and hands it to the dispatcher through
/// the attempt's error channel.
#[derive(Debug)]
pub(crate) struct Failure<E> {
    pub(crate) dependency: DependencyName,
    pub(crate) depth: u32,
    pub(crate) fault: Fault<E>,
}

/// Report of a dispatch that resolved successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// ID of the dispatched request.
    pub request_id: u64,
    /// Number of fan-outs started, the first attempt included.
    pub attempts: usize,
    /// Deepest depth any attempt ran at.
    pub max_depth_reached: u32,
    /// Errors the dispatcher acted on across all attempts.
    pub errors_observed: usize,
}

impl Dispatched {
    pub(crate) fn new(request_id: u64, depth: u32) -> Self {
        Self {
            request_id,
            attempts: 0,
            max_depth_reached: depth,
            errors_observed: 0,
        }
    }

    pub(crate) fn record_attempt(&mut self, depth: u32) {
        self.attempts += 1;
        self.max_depth_reached = self.max_depth_reached.max(depth);
    }

    /// Returns `true` if at least one retry happened.
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}
