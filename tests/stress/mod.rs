//! Stress tests for the fan-out dispatcher.
//!
//! ## What We Test
//!
//! - **High volume**: hundreds of thousands of dependency calls
//! - **High concurrency**: many requests fanning out at once
//! - **Wide fan-out**: hundreds of dependencies per attempt
//! - **Resource cleanup**: abandoned calls never pile up

pub mod dispatch;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Utility: Track peak concurrent dependency calls
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Count a call as running until the returned guard drops.
    pub fn enter(self: &Arc<Self>) -> InFlight {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// A running call; dropped when the call finishes or is cancelled.
pub struct InFlight(Arc<ConcurrencyTracker>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}
