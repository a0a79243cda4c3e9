//! Tally of one strategy's runs.

use std::fmt;
use std::time::Duration;
use tower_fanout::{DispatchError, Dispatched};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub runs: usize,
    pub succeeded: usize,
    pub aborted: usize,
    pub exhausted: usize,
    pub attempts: usize,
    pub deepest: u32,
    pub total: Duration,
    pub slowest: Duration,
}

impl RunSummary {
    pub fn record<E>(&mut self, outcome: &Result<Dispatched, DispatchError<E>>, elapsed: Duration) {
        self.runs += 1;
        self.total += elapsed;
        self.slowest = self.slowest.max(elapsed);

        match outcome {
            Ok(report) => {
                self.succeeded += 1;
                self.attempts += report.attempts;
                self.deepest = self.deepest.max(report.max_depth_reached);
            }
            Err(err) => {
                if err.is_retries_exhausted() {
                    self.exhausted += 1;
                } else {
                    self.aborted += 1;
                }
                self.deepest = self.deepest.max(err.depth());
            }
        }
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.runs) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(runs) => self.total / runs,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs: {} succeeded, {} aborted, {} exhausted; deepest retry {}; mean {:?}, slowest {:?}",
            self.runs,
            self.succeeded,
            self.aborted,
            self.exhausted,
            self.deepest,
            truncate_to_millis(self.mean()),
            truncate_to_millis(self.slowest),
        )
    }
}

/// Drop sub-millisecond precision for display.
pub fn truncate_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
