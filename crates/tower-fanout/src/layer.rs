//! Tower Layer implementation for the dispatcher.

use crate::config::{DispatcherConfig, DispatcherConfigBuilder};
use crate::Dispatcher;
use std::sync::Arc;
use tower_layer::Layer;

/// A Tower [`Layer`] that fans requests out over a dependency service.
///
/// The wrapped service is the dependency call; the resulting [`Dispatcher`]
/// accepts [`Request`](crate::Request)s.
///
/// See the [crate-level documentation](crate) for more details.
#[derive(Clone)]
pub struct DispatcherLayer {
    config: Arc<DispatcherConfig>,
}

impl DispatcherLayer {
    /// Create a `DispatcherLayer` with the default configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tower_fanout::DispatcherLayer;
    ///
    /// let layer = DispatcherLayer::new();
    /// ```
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the dispatcher layer.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tower_fanout::DispatcherLayer;
    ///
    /// let layer = DispatcherLayer::builder()
    ///     .drain()
    ///     .max_depth(5)
    ///     .build();
    /// ```
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::new()
    }

    /// Create a `DispatcherLayer` from a configuration.
    pub(crate) fn from_config(config: DispatcherConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for DispatcherLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for DispatcherLayer {
    type Service = Dispatcher<S>;

    fn layer(&self, service: S) -> Self::Service {
        Dispatcher::new(service, Arc::clone(&self.config))
    }
}
