//! Congestion control: TCP Tahoe and TCP Reno.
//!
//! The controller owns `cwnd`, `ssthresh`, and the duplicate-ACK counter;
//! the sender owns the retransmit machinery and asks the controller what to
//! do on each ACK event. Units are segments throughout.
//!
//! ```text
//!            new ACK, cwnd < ssthresh         new ACK, cwnd ≥ ssthresh
//!          ┌─────────────┐                  ┌──────────────────────┐
//!          │  slow start │─────────────────▶│ congestion avoidance │
//!          └─────────────┘   cwnd crosses   └──────────────────────┘
//!                 ▲           ssthresh                 │
//!        timeout, │                                    │ 3 dup ACKs
//!        3 dup    │                                    ▼
//!        ACKs     │                          ┌──────────────────┐
//!        (Tahoe)  └──────────────────────────│  fast retransmit │
//!                                            └──────────────────┘
//!                                                      │ Reno only
//!                                                      ▼
//!                                            ┌──────────────────┐
//!                                            │  fast recovery   │
//!                                            └──────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

/// Which loss-response regime the sender runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// On any loss signal: collapse cwnd to 1 and slow-start again.
    Tahoe,
    /// Adds fast recovery: dup-ACK losses halve the window instead.
    Reno,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Tahoe => write!(f, "tahoe"),
            Algorithm::Reno => write!(f, "reno"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tahoe" => Ok(Algorithm::Tahoe),
            "reno" => Ok(Algorithm::Reno),
            other => Err(format!("unknown algorithm '{other}' (expected tahoe or reno)")),
        }
    }
}

/// Sender-side congestion state. Windows are in segments.
#[derive(Debug)]
pub struct CongestionController {
    algorithm: Algorithm,
    max_window: u32,
    cwnd: u32,
    ssthresh: u32,
    dup_ack_count: u32,
    in_fast_recovery: bool,
    recovery_point: u32,
}

impl CongestionController {
    /// Start in slow start with `cwnd = 1` and `ssthresh = max_window`.
    pub fn new(algorithm: Algorithm, max_window: u32) -> Self {
        Self {
            algorithm,
            max_window,
            cwnd: 1,
            ssthresh: max_window,
            dup_ack_count: 0,
            in_fast_recovery: false,
            recovery_point: 0,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.in_fast_recovery
    }

    pub fn dup_ack_count(&self) -> u32 {
        self.dup_ack_count
    }

    /// A cumulative ACK advanced the left window edge by `newly_acked`
    /// segments.
    pub fn on_new_ack(&mut self, ack: u32, newly_acked: u32) {
        self.dup_ack_count = 0;

        if self.in_fast_recovery {
            if ack >= self.recovery_point {
                self.in_fast_recovery = false;
                self.cwnd = self.ssthresh;
                log::debug!("[cc] exiting fast recovery, cwnd={}", self.cwnd);
            } else if self.algorithm == Algorithm::Reno {
                // Partial ACK: keep the pipe full while holes remain.
                self.cwnd += newly_acked;
            }
        } else if self.cwnd < self.ssthresh {
            // Slow start: exponential growth.
            self.cwnd += newly_acked;
        } else {
            // Congestion avoidance: roughly one segment per RTT.
            self.cwnd += (newly_acked * newly_acked / self.cwnd).max(1);
        }

        self.cwnd = self.cwnd.min(self.max_window);
    }

    /// A duplicate ACK for `last_byte_acked` arrived. Returns `true` when
    /// this is the third consecutive duplicate and the caller must fast
    /// retransmit segment `last_byte_acked + 1`.
    pub fn on_dup_ack(&mut self, last_byte_acked: u32) -> bool {
        self.dup_ack_count += 1;

        if self.dup_ack_count == 3 {
            self.dup_ack_count = 0;
            self.ssthresh = (self.cwnd / 2).max(2);
            match self.algorithm {
                Algorithm::Tahoe => {
                    self.cwnd = 1;
                    self.in_fast_recovery = false;
                }
                Algorithm::Reno => {
                    // Three dup ACKs mean three segments left the network.
                    self.cwnd = self.ssthresh + 3;
                    self.recovery_point = last_byte_acked;
                    self.in_fast_recovery = true;
                    log::debug!(
                        "[cc] entering fast recovery, cwnd={} recovery_point={}",
                        self.cwnd,
                        self.recovery_point
                    );
                }
            }
            return true;
        }

        if self.in_fast_recovery && self.algorithm == Algorithm::Reno {
            // Window inflation: each further dup ACK signals a departure.
            self.cwnd += 1;
        }
        false
    }

    /// The retransmission timer expired. Both variants collapse to slow
    /// start.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(2);
        self.cwnd = 1;
        self.in_fast_recovery = false;
        log::debug!("[cc] timeout, cwnd=1 ssthresh={}", self.ssthresh);
    }
}
