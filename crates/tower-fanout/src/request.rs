//! Request types flowing into the dispatcher and out to dependencies.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An incoming request: an ID plus the depth the dispatch starts at.
///
/// Depth starts at 0 and grows by one each time a `Recurse` failure sends the
/// request back out to its dependencies. The ID never changes across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    /// Request identifier, preserved across retries.
    pub id: u64,
    /// Retry depth of the first attempt.
    pub depth: u32,
}

impl Request {
    /// A fresh request at depth 0.
    pub fn new(id: u64) -> Self {
        Self { id, depth: 0 }
    }

    /// A request whose first attempt runs at `depth`.
    pub fn at_depth(id: u64, depth: u32) -> Self {
        Self { id, depth }
    }
}

/// Label of one downstream dependency.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyName(Arc<str>);

impl DependencyName {
    /// Create a dependency label.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DependencyName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DependencyName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl PartialEq<str> for DependencyName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for DependencyName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// One fan-out slot: the call the dispatcher makes to a single dependency.
///
/// The cancellation token is shared by every slot of the same attempt. It is
/// cancelled once the attempt resolves early, so dependencies that honor it
/// can stop work nobody will look at.
#[derive(Debug, Clone)]
pub struct DependencyRequest {
    /// ID of the request being dispatched.
    pub request_id: u64,
    /// Depth of the attempt this call belongs to.
    pub depth: u32,
    /// Which dependency to call.
    pub dependency: DependencyName,
    /// Fires when the attempt no longer needs this call's result.
    pub cancel: CancellationToken,
}

impl DependencyRequest {
    /// The `"<depth> <label>"` tag identifying this call in logs and errors.
    pub fn call_site(&self) -> String {
        format!("{} {}", self.depth, self.dependency)
    }
}
