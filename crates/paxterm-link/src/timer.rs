//! Deadline-based protocol timers.
//!
//! The machine never sleeps; it records deadlines and the session loop
//! sleeps until the earliest one. T3 additionally supports pausing with its
//! remaining time preserved, for the pager coupling.

use std::time::{Duration, Instant};

/// A one-shot timer expressed as an absolute deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    deadline: Option<Instant>,
    paused_remaining: Option<Duration>,
}

impl Timer {
    pub fn start(&mut self, now: Instant, period: Duration) {
        self.deadline = Some(now + period);
        self.paused_remaining = None;
    }

    pub fn stop(&mut self) {
        self.deadline = None;
        self.paused_remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_remaining.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed. A stopped or paused timer never fires.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Suspend the timer, remembering how much time it had left.
    pub fn pause(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline.take() {
            self.paused_remaining = Some(deadline.saturating_duration_since(now));
        }
    }

    /// Resume a paused timer with whatever time it had left.
    pub fn resume(&mut self, now: Instant) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.deadline = Some(now + remaining);
        }
    }
}
