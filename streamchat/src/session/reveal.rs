//! Paced character reveal.
//!
//! Incoming fragments are split into characters and queued; the scheduler
//! releases one character per tick at a fixed cadence no matter how large or
//! how frequent the fragments are. A tick is "in flight" while
//! [`RevealScheduler::next_tick`] is set. A tick that finds nothing to do
//! clears it, and the loop stays idle until [`RevealScheduler::start`] is
//! called for the next fragment.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::Session;

/// Outcome of a single reveal tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// One character was appended to the active message.
    Revealed(char),
    /// The loop halted: queue empty or no active message.
    Halted,
}

/// FIFO of pending characters plus the deadline of the next tick.
#[derive(Debug)]
pub struct RevealScheduler {
    queue: VecDeque<char>,
    next_tick: Option<Instant>,
    cadence: Duration,
}

impl RevealScheduler {
    /// Create an idle scheduler revealing one character per `cadence`.
    #[must_use]
    pub const fn new(cadence: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            next_tick: None,
            cadence,
        }
    }

    /// Interval between consecutive reveals.
    #[must_use]
    pub const fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Queue every character of `fragment` behind the ones already pending.
    pub fn enqueue(&mut self, fragment: &str) {
        self.queue.extend(fragment.chars());
    }

    /// Schedule a tick at `now` unless one is already in flight.
    pub fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() && !self.queue.is_empty() {
            self.next_tick = Some(now);
        }
    }

    /// Deadline of the tick in flight, if any.
    #[must_use]
    pub const fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Number of characters waiting to be revealed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// No pending characters and no tick in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.next_tick.is_none()
    }

    /// Run the tick that was due at `at`.
    ///
    /// Pops one character into the session's active message and schedules
    /// the next tick `cadence` later. With nothing queued, or nothing active
    /// to reveal into, the queue is dropped and the loop halts.
    pub fn tick(&mut self, at: Instant, session: &mut Session) -> Tick {
        if session.active_id().is_none() {
            self.cancel();
            return Tick::Halted;
        }
        let Some(unit) = self.queue.pop_front() else {
            self.next_tick = None;
            return Tick::Halted;
        };
        session.reveal_into_active(unit);
        self.next_tick = Some(at + self.cadence);
        Tick::Revealed(unit)
    }

    /// Drop all pending characters and any tick in flight.
    pub fn cancel(&mut self) {
        self.queue.clear();
        self.next_tick = None;
    }
}
