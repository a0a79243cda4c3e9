//! Failure classification shared by all fan-out dispatchers.
//!
//! A dispatcher never looks at an error's message to decide what to do next.
//! Instead the error type answers a capability question through [`Classify`]:
//! is this failure worth another fan-out at the next depth, or is it final?
//!
//! ```
//! use tower_fanout_core::{Classify, FailureKind};
//!
//! #[derive(Debug)]
//! enum UpstreamError {
//!     Overloaded,
//!     NotFound,
//! }
//!
//! impl Classify for UpstreamError {
//!     fn kind(&self) -> FailureKind {
//!         match self {
//!             UpstreamError::Overloaded => FailureKind::Recurse,
//!             UpstreamError::NotFound => FailureKind::Normal,
//!         }
//!     }
//! }
//!
//! assert!(UpstreamError::Overloaded.is_recurse());
//! assert!(!UpstreamError::NotFound.is_recurse());
//! ```

use std::fmt;

/// How a dispatcher reacts to a failed dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transient: fan out again at `depth + 1` for the same request.
    Recurse,
    /// Terminal: abort the request.
    Normal,
}

impl FailureKind {
    /// Short lowercase label used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Recurse => "recurse",
            FailureKind::Normal => "normal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability check exposing the [`FailureKind`] of an error.
pub trait Classify {
    /// The kind of this failure.
    fn kind(&self) -> FailureKind;

    /// Returns `true` if the failure should trigger a retry at the next depth.
    fn is_recurse(&self) -> bool {
        self.kind() == FailureKind::Recurse
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> FailureKind {
        (**self).kind()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> FailureKind {
        (**self).kind()
    }
}
