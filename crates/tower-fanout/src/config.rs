//! Configuration for the fan-out dispatcher.

use crate::events::{DispatchEvent, ErrorAction};
use crate::layer::DispatcherLayer;
use crate::request::DependencyName;
use std::fmt;
use std::time::Duration;
use tower_fanout_core::{EventListener, EventListeners, FailureKind, FnListener};

/// Default dependency labels, one fan-out slot each.
pub const DEFAULT_DEPENDENCIES: [&str; 4] = ["SA", "SB", "SC", "SD"];

/// Default maximum retry depth.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// How the dispatcher combines the outcomes of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FanInStrategy {
    /// Resolve on the first error, or once every call has succeeded.
    #[default]
    Race,
    /// Wait for every call and act on every error, in arrival order.
    Drain,
}

impl FanInStrategy {
    /// Short lowercase label used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FanInStrategy::Race => "race",
            FanInStrategy::Drain => "drain",
        }
    }
}

impl fmt::Display for FanInStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the dispatcher service.
///
/// Like the layer it builds, the configuration does not depend on the
/// dependency service's types; those are only constrained when the layer is
/// applied.
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Name for events/tracing.
    pub(crate) name: String,
    /// One fan-out slot per label.
    pub(crate) dependencies: Vec<DependencyName>,
    /// Fan-in strategy.
    pub(crate) strategy: FanInStrategy,
    /// Deepest depth an attempt may run at; `None` retries forever.
    pub(crate) max_depth: Option<u32>,
    /// Cancel sibling calls once their attempt has resolved early.
    pub(crate) cancel_abandoned: bool,
    /// Event listeners.
    pub(crate) listeners: EventListeners<DispatchEvent>,
}

impl DispatcherConfig {
    /// Returns `true` if an attempt at `depth` may start a retry chain.
    pub(crate) fn can_retry_from(&self, depth: u32) -> bool {
        self.max_depth.is_none_or(|max| depth < max)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "dispatcher".to_string(),
            dependencies: DEFAULT_DEPENDENCIES
                .into_iter()
                .map(DependencyName::new)
                .collect(),
            strategy: FanInStrategy::default(),
            max_depth: Some(DEFAULT_MAX_DEPTH),
            cancel_abandoned: true,
            listeners: EventListeners::default(),
        }
    }
}

/// Builder for [`DispatcherConfig`].
///
/// # Example
///
/// ```rust
/// use tower_fanout::DispatcherLayer;
///
/// let layer = DispatcherLayer::builder()
///     .name("checkout")
///     .dependencies(["inventory", "pricing", "tax"])
///     .drain()
///     .max_depth(3)
///     .build();
/// ```
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherConfigBuilder {
    /// Create a new builder with default settings.
    ///
    /// Defaults:
    /// - dependencies: `SA`, `SB`, `SC`, `SD`
    /// - strategy: race
    /// - max depth: 10
    /// - abandoned calls are cancelled
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
        }
    }

    /// Set the name for this dispatcher instance (used in events/tracing).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the dependency labels; each attempt fans out to every one of them.
    pub fn dependencies<I, N>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<DependencyName>,
    {
        self.config.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the fan-in strategy.
    pub fn strategy(mut self, strategy: FanInStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Resolve on the first error (the default).
    pub fn race(self) -> Self {
        self.strategy(FanInStrategy::Race)
    }

    /// Wait for every dependency and act on every error.
    pub fn drain(self) -> Self {
        self.strategy(FanInStrategy::Drain)
    }

    /// Set the deepest depth an attempt may run at.
    ///
    /// A `Recurse` error observed at this depth resolves the request as
    /// [`DispatchError::RetriesExhausted`](crate::DispatchError::RetriesExhausted).
    /// `max_depth(0)` disables retries.
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = Some(max_depth);
        self
    }

    /// Retry `Recurse` errors without limit.
    ///
    /// A dependency that keeps failing with `Recurse` keeps the request alive
    /// forever.
    pub fn unlimited_depth(mut self) -> Self {
        self.config.max_depth = None;
        self
    }

    /// Whether calls still running when their attempt resolves are cancelled.
    ///
    /// Defaults to `true`. With `false`, abandoned calls run to completion and
    /// their results are discarded.
    pub fn cancel_abandoned(mut self, cancel: bool) -> Self {
        self.config.cancel_abandoned = cancel;
        self
    }

    /// Add an event listener for dispatch events.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tower_fanout::{DispatchEvent, DispatcherLayer};
    /// use tower_fanout_core::FnListener;
    ///
    /// let layer = DispatcherLayer::builder()
    ///     .on_event(FnListener::new(|event: &DispatchEvent| {
    ///         if let DispatchEvent::AttemptStarted { depth, .. } = event {
    ///             println!("fan-out at depth {}", depth);
    ///         }
    ///     }))
    ///     .build();
    /// ```
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<DispatchEvent> + 'static,
    {
        self.config.listeners.add(listener);
        self
    }

    /// Register a callback for each successful dependency call:
    /// `(depth, dependency, elapsed)`.
    pub fn on_dependency_success<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &DependencyName, Duration) + Send + Sync + 'static,
    {
        self.config.listeners.add(FnListener::new(move |event: &DispatchEvent| {
            if let DispatchEvent::DependencySucceeded {
                depth,
                dependency,
                elapsed,
                ..
            } = event
            {
                f(*depth, dependency, *elapsed);
            }
        }));
        self
    }

    /// Register a callback for each error the dispatcher acts on.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&DependencyName, FailureKind, ErrorAction) + Send + Sync + 'static,
    {
        self.config.listeners.add(FnListener::new(move |event: &DispatchEvent| {
            if let DispatchEvent::ErrorObserved {
                dependency,
                kind,
                action,
                ..
            } = event
            {
                f(dependency, *kind, *action);
            }
        }));
        self
    }

    /// Register a callback for each resolved attempt: `(depth, succeeded)`.
    pub fn on_resolved<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        self.config.listeners.add(FnListener::new(move |event: &DispatchEvent| {
            if let DispatchEvent::AttemptResolved {
                depth, succeeded, ..
            } = event
            {
                f(*depth, *succeeded);
            }
        }));
        self
    }

    /// Build the [`DispatcherLayer`].
    pub fn build(self) -> DispatcherLayer {
        DispatcherLayer::from_config(self.config)
    }
}
