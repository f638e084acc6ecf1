//! Tunable protocol parameters.
//!
//! One [`Config`] is shared by both engines of a connection. The defaults
//! reproduce the classic classroom setup: 5 KiB chunks, a 256 KiB receive
//! buffer, 10% simulated data loss and 1% simulated ACK loss.

use std::time::Duration;

/// Protocol tunables for one transfer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Payload size per DATA segment, in bytes.
    pub chunk_size: usize,

    /// Receiver delivery-buffer capacity, in bytes.
    pub rcv_buffer: usize,

    /// Upper bound on the congestion window, in segments.
    pub max_window: u32,

    /// Minimum gap between zero-window persist probes.
    pub persist_interval: Duration,

    /// Delayed-ACK deadline.
    pub delayed_ack: Duration,

    /// Minimum gap between timeout scans on the sender.
    pub timeout_check: Duration,

    /// Application-read cadence on the receiver.
    pub app_drain_interval: Duration,

    /// Bytes drained from the delivery buffer per application read.
    pub app_drain_bytes: usize,

    /// Probability that an inbound DATA segment is dropped by the simulator.
    pub data_loss_prob: f64,

    /// Probability that an outbound ACK is dropped by the simulator.
    pub ack_loss_prob: f64,

    /// Optional per-segment retransmission cap. `None` retries forever.
    pub max_retransmits: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024,
            rcv_buffer: 256 * 1024,
            max_window: 128,
            persist_interval: Duration::from_millis(1000),
            delayed_ack: Duration::from_millis(200),
            timeout_check: Duration::from_millis(50),
            app_drain_interval: Duration::from_millis(100),
            app_drain_bytes: 8 * 1024,
            data_loss_prob: 0.10,
            ack_loss_prob: 0.01,
            max_retransmits: None,
        }
    }
}

impl Config {
    /// A configuration with both simulated loss processes disabled.
    pub fn lossless() -> Self {
        Self {
            data_loss_prob: 0.0,
            ack_loss_prob: 0.0,
            ..Self::default()
        }
    }
}
