//! Delayed-ACK coalescing.
//!
//! Implements the "every other segment or 200 ms, whichever first" policy:
//!
//! - in-order delivery while idle: schedule an ACK for `now + delay`;
//! - in-order delivery while one is pending: ACK immediately, covering both
//!   segments, and cancel the timer;
//! - timer expiry: ACK immediately;
//! - any immediate ACK emitted for other reasons (duplicate, probe,
//!   buffer-full discard, END) also satisfies a pending deadline, since the
//!   cumulative value rides along with it.

use std::time::{Duration, Instant};

/// What the receiver should do after an in-order delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Emit the cumulative ACK now (second segment coalesced).
    SendNow,
    /// Hold the ACK until the deadline (first segment of a pair).
    Scheduled(Instant),
}

/// Two-state scheduler: idle, or holding one pending ACK.
#[derive(Debug)]
pub struct DelayedAck {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DelayedAck {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// An in-order segment was delivered.
    pub fn on_in_order(&mut self, now: Instant) -> AckDecision {
        match self.deadline.take() {
            Some(_) => AckDecision::SendNow,
            None => {
                let deadline = now + self.delay;
                self.deadline = Some(deadline);
                AckDecision::Scheduled(deadline)
            }
        }
    }

    /// An ACK was just emitted for some other reason; a pending deadline is
    /// satisfied by it.
    pub fn on_immediate_ack(&mut self) {
        self.deadline = None;
    }

    /// The deadline fired; the caller emits the cumulative ACK.
    pub fn on_expiry(&mut self) {
        self.deadline = None;
    }

    /// Deadline of the pending ACK, if one is held.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
