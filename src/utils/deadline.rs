//! Absolute time budget shared by every fetch of one resolution

use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time after which no new fetch may start
///
/// Built once when a resolution begins and passed by value through every
/// stage, so the total wall-clock time of a resolution stays within `budget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a new budget now
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Time left before the deadline, zero once exhausted
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Cap a per-call timeout so it never outlives the deadline
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}
