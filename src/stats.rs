//! Per-transfer counters.
//!
//! The engines maintain the counters; printing the end-of-transfer summary
//! is left to the front end.

use std::fmt;

/// Counters kept by the sender engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderStats {
    /// DATA and END frames written, including retransmissions.
    pub packets_sent: u64,
    /// Retransmissions (timeout-driven and fast retransmits).
    pub retransmissions: u64,
    /// Zero-window probes written.
    pub probes_sent: u64,
}

impl fmt::Display for SenderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total packets sent:    {}", self.packets_sent)?;
        writeln!(f, "retransmissions:       {}", self.retransmissions)?;
        write!(f, "persist probes sent:   {}", self.probes_sent)
    }
}

/// Counters kept by the receiver engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverStats {
    /// DATA segments that survived the loss simulator.
    pub packets_received: u64,
    /// DATA segments dropped by the loss simulator.
    pub packets_dropped: u64,
    /// ACKs actually written to the channel.
    pub acks_sent: u64,
    /// ACKs dropped by the loss simulator.
    pub acks_dropped: u64,
    /// Duplicate ACKs among those written.
    pub dup_acks_sent: u64,
}

impl ReceiverStats {
    /// Fraction of inbound DATA segments dropped by the simulator.
    pub fn packet_loss_rate(&self) -> f64 {
        ratio(self.packets_dropped, self.packets_received + self.packets_dropped)
    }

    /// Fraction of outbound ACKs dropped by the simulator.
    pub fn ack_loss_rate(&self) -> f64 {
        ratio(self.acks_dropped, self.acks_sent + self.acks_dropped)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl fmt::Display for ReceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "packets received:      {}", self.packets_received)?;
        writeln!(f, "packets lost (sim):    {}", self.packets_dropped)?;
        writeln!(f, "ACKs sent:             {}", self.acks_sent)?;
        writeln!(f, "duplicate ACKs sent:   {}", self.dup_acks_sent)?;
        writeln!(f, "ACKs lost (sim):       {}", self.acks_dropped)?;
        writeln!(f, "packet loss rate:      {:.2}%", self.packet_loss_rate() * 100.0)?;
        write!(f, "ACK loss rate:         {:.2}%", self.ack_loss_rate() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_rates() {
        let stats = ReceiverStats {
            packets_received: 90,
            packets_dropped: 10,
            acks_sent: 99,
            acks_dropped: 1,
            dup_acks_sent: 12,
        };
        assert!((stats.packet_loss_rate() - 0.10).abs() < 1e-9);
        assert!((stats.ack_loss_rate() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn empty_rates_are_zero() {
        let stats = ReceiverStats::default();
        assert_eq!(stats.packet_loss_rate(), 0.0);
        assert_eq!(stats.ack_loss_rate(), 0.0);
    }
}
