//! Simulated packet and ACK loss.
//!
//! The underlying byte channel is lossless, so the reliability machinery
//! would never be exercised without artificial drops. The receiver draws two
//! independent Bernoulli processes: one against inbound DATA segments and
//! one against outbound ACKs. Seeding the RNG makes a lossy run reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;

/// Independent Bernoulli drop processes for one connection.
#[derive(Debug)]
pub struct LossSimulator {
    data_loss_prob: f64,
    ack_loss_prob: f64,
    rng: StdRng,
}

impl LossSimulator {
    /// Simulator with an OS-seeded RNG.
    pub fn new(data_loss_prob: f64, ack_loss_prob: f64) -> Self {
        Self::from_rng(data_loss_prob, ack_loss_prob, StdRng::from_os_rng())
    }

    /// Simulator with a fixed seed for reproducible runs.
    pub fn seeded(data_loss_prob: f64, ack_loss_prob: f64, seed: u64) -> Self {
        Self::from_rng(data_loss_prob, ack_loss_prob, StdRng::seed_from_u64(seed))
    }

    /// Pass-through simulator: nothing is ever dropped.
    pub fn disabled() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Simulator using the probabilities in `cfg`, optionally seeded.
    pub fn from_config(cfg: &Config, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(cfg.data_loss_prob, cfg.ack_loss_prob, seed),
            None => Self::new(cfg.data_loss_prob, cfg.ack_loss_prob),
        }
    }

    fn from_rng(data_loss_prob: f64, ack_loss_prob: f64, rng: StdRng) -> Self {
        assert!((0.0..=1.0).contains(&data_loss_prob));
        assert!((0.0..=1.0).contains(&ack_loss_prob));
        Self {
            data_loss_prob,
            ack_loss_prob,
            rng,
        }
    }

    /// Draw the ingress process: `true` means drop this DATA segment.
    pub fn drop_data(&mut self) -> bool {
        self.data_loss_prob > 0.0 && self.rng.random_bool(self.data_loss_prob)
    }

    /// Draw the egress process: `true` means drop this ACK.
    pub fn drop_ack(&mut self) -> bool {
        self.ack_loss_prob > 0.0 && self.rng.random_bool(self.ack_loss_prob)
    }
}
