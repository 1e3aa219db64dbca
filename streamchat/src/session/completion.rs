//! End-of-message inference from wire silence.
//!
//! The wire carries no terminator, so a reply is considered complete once no
//! fragment has arrived for the quiet window *and* every received character
//! has been revealed. The first condition is a timer re-armed on each
//! fragment; the second is checked when that timer fires, and if the reveal
//! loop is still busy the check is repeated at a shorter interval.

use std::time::Duration;

use tokio::time::Instant;

/// Result of evaluating the completion timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Silence observed and reveal drained: finalize the active message.
    Complete,
    /// Reveal still busy: a recheck has been scheduled.
    Draining,
}

/// Quiet-window timer with a drain recheck phase.
#[derive(Debug)]
pub struct CompletionDetector {
    deadline: Option<Instant>,
    quiet_window: Duration,
    drain_recheck: Duration,
}

impl CompletionDetector {
    /// Create a disarmed detector.
    #[must_use]
    pub const fn new(quiet_window: Duration, drain_recheck: Duration) -> Self {
        Self {
            deadline: None,
            quiet_window,
            drain_recheck,
        }
    }

    /// Restart the quiet window from `now`, replacing any pending deadline.
    pub fn rearm(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet_window);
    }

    /// Deadline of the next evaluation, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Evaluate the timer that fired at `at`.
    ///
    /// Disarms on [`Verdict::Complete`]; otherwise re-arms for
    /// `at + drain_recheck`.
    pub fn evaluate(&mut self, at: Instant, reveal_idle: bool) -> Verdict {
        if reveal_idle {
            self.deadline = None;
            Verdict::Complete
        } else {
            self.deadline = Some(at + self.drain_recheck);
            Verdict::Draining
        }
    }

    /// Disarm without evaluating.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
