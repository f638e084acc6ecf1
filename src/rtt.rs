//! Adaptive retransmission-timeout estimation.
//!
//! Jacobson/Karels smoothing (RFC 6298 shape, classroom constants):
//!
//! ```text
//! est_rtt ← (1−α)·est_rtt + α·S          α = 0.125
//! dev_rtt ← (1−β)·dev_rtt + β·|S−est_rtt|  β = 0.25
//! rto     ← max(200 ms, est_rtt + 4·dev_rtt)
//! ```
//!
//! Karn's rule is enforced by the caller: only segments that were never
//! retransmitted feed [`RttEstimator::sample`].

use std::time::Duration;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

/// Floor on the retransmission timeout, preventing spurious timeouts.
pub const RTO_MIN_MS: f64 = 200.0;

/// Smoothed RTT state for one connection. All values in milliseconds.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    est_rtt: f64,
    dev_rtt: f64,
    rto: f64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            est_rtt: 1000.0,
            dev_rtt: 100.0,
            rto: 1400.0,
        }
    }

    /// Fold a fresh RTT measurement into the estimate.
    pub fn sample(&mut self, rtt: Duration) {
        let s = rtt.as_secs_f64() * 1000.0;
        self.est_rtt = (1.0 - ALPHA) * self.est_rtt + ALPHA * s;
        self.dev_rtt = (1.0 - BETA) * self.dev_rtt + BETA * (s - self.est_rtt).abs();
        self.rto = (self.est_rtt + 4.0 * self.dev_rtt).max(RTO_MIN_MS);
    }

    /// Current smoothed RTT estimate in milliseconds.
    pub fn est_rtt_ms(&self) -> f64 {
        self.est_rtt
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        Duration::from_secs_f64(self.rto / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values() {
        let rtt = RttEstimator::new();
        assert_eq!(rtt.est_rtt_ms(), 1000.0);
        assert_eq!(rtt.rto(), Duration::from_millis(1400));
    }

    #[test]
    fn sample_pulls_estimate_toward_measurement() {
        let mut rtt = RttEstimator::new();
        rtt.sample(Duration::from_millis(100));
        // est = 0.875·1000 + 0.125·100 = 887.5
        assert!((rtt.est_rtt_ms() - 887.5).abs() < 1e-9);
    }

    #[test]
    fn converges_on_stable_rtt() {
        let mut rtt = RttEstimator::new();
        for _ in 0..200 {
            rtt.sample(Duration::from_millis(50));
        }
        assert!((rtt.est_rtt_ms() - 50.0).abs() < 1.0);
        // dev_rtt decays toward 0, so rto approaches the floor.
        assert_eq!(rtt.rto(), Duration::from_millis(200));
    }

    #[test]
    fn rto_never_below_floor() {
        let mut rtt = RttEstimator::new();
        for _ in 0..500 {
            rtt.sample(Duration::from_millis(1));
        }
        assert!(rtt.rto() >= Duration::from_millis(200));
    }

    #[test]
    fn variance_widens_rto() {
        let mut stable = RttEstimator::new();
        let mut jittery = RttEstimator::new();
        for i in 0..100 {
            stable.sample(Duration::from_millis(300));
            let wobble = if i % 2 == 0 { 100 } else { 500 };
            jittery.sample(Duration::from_millis(wobble));
        }
        assert!(jittery.rto() > stable.rto());
    }
}
