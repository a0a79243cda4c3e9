//! Core infrastructure for tower-fanout.
//!
//! This crate provides the pieces shared by every fan-out dispatcher:
//! - Event system for observability
//! - The failure taxonomy dispatchers branch on ([`FailureKind`], [`Classify`])

pub mod classify;
pub mod events;

pub use classify::{Classify, FailureKind};
pub use events::{EventListener, EventListeners, FanoutEvent, FnListener};
