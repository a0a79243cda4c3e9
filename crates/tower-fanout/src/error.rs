//! Error types for the fan-out dispatcher.

use crate::request::DependencyName;
use std::fmt;
use tower_fanout_core::{Classify, FailureKind};

/// Failure of a single simulated dependency call.
///
/// `Recurse` and `Normal` carry the same payload and differ only in their tag,
/// which is what [`Classify`] reports. The cause is the `"<depth> <label>"`
/// call site that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    /// Transient failure: the dispatcher retries at the next depth.
    #[error("{cause}: RECURSE ERROR")]
    Recurse {
        /// Call site that failed.
        cause: String,
    },

    /// Terminal failure: the dispatcher aborts the request.
    #[error("{cause}: NORMAL ERROR")]
    Normal {
        /// Call site that failed.
        cause: String,
    },

    /// The attempt resolved before this call finished.
    ///
    /// Nobody reads these; they exist so a cancelled call still completes
    /// its future with a value.
    #[error("{cause}: cancelled")]
    Cancelled {
        /// Call site that was cancelled.
        cause: String,
    },
}

impl DependencyError {
    /// The call site that produced this error.
    pub fn cause(&self) -> &str {
        match self {
            DependencyError::Recurse { cause }
            | DependencyError::Normal { cause }
            | DependencyError::Cancelled { cause } => cause,
        }
    }
}

impl Classify for DependencyError {
    fn kind(&self) -> FailureKind {
        match self {
            DependencyError::Recurse { .. } => FailureKind::Recurse,
            DependencyError::Normal { .. } | DependencyError::Cancelled { .. } => {
                FailureKind::Normal
            }
        }
    }
}

/// Terminal resolution of a dispatch.
#[derive(Debug, Clone)]
pub enum DispatchError<E> {
    /// A `Normal` failure aborted the request.
    Aborted {
        /// ID of the aborted request.
        request_id: u64,
        /// Depth of the attempt that observed the failure.
        depth: u32,
        /// Dependency whose call failed.
        dependency: DependencyName,
        /// The dependency's error.
        source: E,
    },

    /// A `Recurse` failure arrived at an attempt already at the maximum depth.
    RetriesExhausted {
        /// ID of the request.
        request_id: u64,
        /// Depth of the attempt that could not retry.
        depth: u32,
        /// Dependency whose call failed.
        dependency: DependencyName,
        /// The dependency's error.
        source: E,
    },

    /// A dependency call panicked. The request is aborted as if the call
    /// had failed with a `Normal` error.
    Panicked {
        /// ID of the aborted request.
        request_id: u64,
        /// Depth of the attempt the call belonged to.
        depth: u32,
        /// Dependency whose call panicked.
        dependency: DependencyName,
    },
}

impl<E: fmt::Display> fmt::Display for DispatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Aborted {
                request_id,
                depth,
                dependency,
                source,
            } => write!(
                f,
                "request {} aborted at depth {} by {}: {}",
                request_id, depth, dependency, source
            ),
            DispatchError::RetriesExhausted {
                request_id,
                depth,
                dependency,
                source,
            } => write!(
                f,
                "request {} exhausted retries at depth {} ({}): {}",
                request_id, depth, dependency, source
            ),
            DispatchError::Panicked {
                request_id,
                depth,
                dependency,
            } => write!(
                f,
                "request {} aborted at depth {}: {} panicked",
                request_id, depth, dependency
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for DispatchError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Aborted { source, .. } => Some(source),
            DispatchError::RetriesExhausted { source, .. } => Some(source),
            DispatchError::Panicked { .. } => None,
        }
    }
}

impl<E> DispatchError<E> {
    /// Returns `true` if a `Normal` failure aborted the request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, DispatchError::Aborted { .. })
    }

    /// Returns `true` if a dependency call panicked.
    pub fn is_panicked(&self) -> bool {
        matches!(self, DispatchError::Panicked { .. })
    }

    /// Returns `true` if the maximum retry depth was reached.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, DispatchError::RetriesExhausted { .. })
    }

    /// ID of the request that failed.
    pub fn request_id(&self) -> u64 {
        match self {
            DispatchError::Aborted { request_id, .. }
            | DispatchError::RetriesExhausted { request_id, .. }
            | DispatchError::Panicked { request_id, .. } => *request_id,
        }
    }

    /// Depth of the attempt that resolved the request.
    pub fn depth(&self) -> u32 {
        match self {
            DispatchError::Aborted { depth, .. }
            | DispatchError::RetriesExhausted { depth, .. }
            | DispatchError::Panicked { depth, .. } => *depth,
        }
    }

    /// Dependency whose failure resolved the request.
    pub fn dependency(&self) -> &DependencyName {
        match self {
            DispatchError::Aborted { dependency, .. }
            | DispatchError::RetriesExhausted { dependency, .. }
            | DispatchError::Panicked { dependency, .. } => dependency,
        }
    }

    /// Get a reference to the dependency's error, if it returned one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            DispatchError::Aborted { source, .. }
            | DispatchError::RetriesExhausted { source, .. } => Some(source),
            DispatchError::Panicked { .. } => None,
        }
    }

    /// Convert into the dependency's error, if it returned one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            DispatchError::Aborted { source, .. }
            | DispatchError::RetriesExhausted { source, .. } => Some(source),
            DispatchError::Panicked { .. } => None,
        }
    }
}
