//! Dispatch events and the listeners that receive them.
//!
//! A dispatcher emits from several places at once: the dispatch future itself
//! and every dependency task of the attempts it started. Listeners are called
//! synchronously on the emitting task, so two events emitted by the same task
//! reach every listener in emission order. Events of concurrent tasks
//! interleave; [`FanoutEvent::request_id`] tells them apart.
//!
//! Listeners only observe. A panicking listener is skipped for that event and
//! never reaches the dependency task or the dispatch that emitted it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// An event emitted while a request is being dispatched.
pub trait FanoutEvent: Send + Sync + fmt::Debug {
    /// Stable snake_case name of the event, e.g. `"attempt_resolved"`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Name of the dispatcher instance that emitted the event.
    fn dispatcher_name(&self) -> &str;

    /// ID of the request whose dispatch produced the event.
    ///
    /// Shared by every attempt of a retry chain.
    fn request_id(&self) -> u64;
}

/// Receives dispatch events.
pub trait EventListener<E: FanoutEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Listeners registered on one dispatcher.
///
/// Cloning is cheap and shares the registered listeners, which is how every
/// dependency task of an attempt gets to emit.
#[derive(Clone)]
pub struct EventListeners<E: FanoutEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: FanoutEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Listeners are called in registration order.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Deliver `event` to every listener on the calling task.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    dispatcher = event.dispatcher_name(),
                    request_id = event.request_id(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }
}

impl<E: FanoutEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener backed by a closure.
pub struct FnListener<E, F> {
    f: F,
    _event: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: FanoutEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
