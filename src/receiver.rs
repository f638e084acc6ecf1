//! Receive-side protocol engine.
//!
//! The per-frame state machine ([`Receiver::handle_segment`]) does no I/O
//! and takes an explicit clock, so every ordering and flow-control case can
//! be unit tested. [`Receiver::run`] wraps it in a single `tokio::select!`
//! task that multiplexes three event sources:
//!
//! - inbound frames (decoded by a background pump task),
//! - the application drainer tick (frees delivery-buffer space),
//! - the delayed-ACK deadline.
//!
//! Running everything on one task serializes access to the receiver state
//! without a mutex: the delayed-ACK deadline and an in-order arrival can
//! never race, so exactly one ACK carries the latest cumulative value.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::delayed_ack::{AckDecision, DelayedAck};
use crate::error::{Error, Result};
use crate::frame::{Ack, FrameReader, FrameWriter, Segment, SegmentKind};
use crate::reorder::ReorderBuffer;
use crate::sim::LossSimulator;
use crate::stats::ReceiverStats;

/// A disarmed timer parks this far in the future.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

/// What the run loop must do after one state-machine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to emit (segment was dropped by the loss simulator).
    None,
    /// Emit the cumulative ACK immediately.
    AckNow { dup: bool },
    /// The ACK was deferred; the delayed-ACK deadline is armed.
    AckLater,
    /// END received; emit the final ACK and stop.
    Finished { final_ack: u32 },
}

/// Bytes and counters handed back when a transfer completes.
#[derive(Debug)]
pub struct Delivery {
    /// In-order payload bytes, exactly as the sender chunked them.
    pub bytes: Vec<u8>,
    pub stats: ReceiverStats,
}

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    cfg: Config,

    /// Next in-order sequence number expected.
    expected_seq: u32,
    /// Highest cumulative ACK emitted so far.
    last_ack_sent: u32,

    reorder: ReorderBuffer,
    delayed: DelayedAck,
    sim: LossSimulator,

    /// In-order bytes accepted so far (the eventual sink content).
    delivered: Vec<u8>,
    /// Bytes that have entered the delivery buffer.
    last_byte_rcvd: usize,
    /// Bytes the modelled application has consumed.
    last_byte_read: usize,

    stats: ReceiverStats,
}

impl Receiver {
    pub fn new(cfg: Config, sim: LossSimulator) -> Self {
        let reorder = ReorderBuffer::new(cfg.chunk_size);
        let delayed = DelayedAck::new(cfg.delayed_ack);
        Self {
            cfg,
            expected_seq: 1,
            last_ack_sent: 0,
            reorder,
            delayed,
            sim,
            delivered: Vec::new(),
            last_byte_rcvd: 0,
            last_byte_read: 0,
            stats: ReceiverStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Process one inbound frame and decide what to emit.
    pub fn handle_segment(&mut self, segment: Segment, now: Instant) -> Step {
        match segment.kind {
            SegmentKind::End => {
                log::info!("[rcv] END packet {}", segment.seq);
                self.delayed.on_immediate_ack();
                self.last_ack_sent = self.last_ack_sent.max(segment.seq);
                Step::Finished {
                    final_ack: segment.seq,
                }
            }
            SegmentKind::Probe => {
                log::debug!("[rcv] PROBE {} (rwnd={})", segment.seq, self.rwnd());
                self.ack_now(false)
            }
            SegmentKind::Data => self.handle_data(segment, now),
        }
    }

    fn handle_data(&mut self, segment: Segment, now: Instant) -> Step {
        // Simulated ingress loss: the segment vanishes before any state is
        // touched, as if the network ate it.
        if self.sim.drop_data() {
            self.stats.packets_dropped += 1;
            log::debug!("[rcv] --- packet {} LOST ---", segment.seq);
            return Step::None;
        }
        self.stats.packets_received += 1;

        let seq = segment.seq;
        if seq < self.expected_seq {
            log::debug!("[rcv] duplicate packet {seq}");
            return self.ack_now(true);
        }

        if self.rwnd() == 0 {
            log::debug!("[rcv] buffer full, discarding packet {seq}");
            return self.ack_now(true);
        }

        if seq == self.expected_seq {
            self.deliver(segment.payload);
            self.last_ack_sent = self.expected_seq - 1;
            match self.delayed.on_in_order(now) {
                AckDecision::SendNow => Step::AckNow { dup: false },
                AckDecision::Scheduled(_) => Step::AckLater,
            }
        } else {
            let accepted = self
                .reorder
                .insert(seq, segment.payload, self.rwnd() as usize);
            if accepted {
                log::debug!("[rcv] out-of-order packet {seq} buffered");
            } else {
                log::debug!("[rcv] reorder buffer full, discarding packet {seq}");
            }
            self.ack_now(true)
        }
    }

    /// Append an in-order payload, then drain any now-contiguous run from
    /// the reorder buffer.
    fn deliver(&mut self, payload: Vec<u8>) {
        log::debug!(
            "[rcv] in-order packet {} ({} bytes) [rwnd={}]",
            self.expected_seq,
            payload.len(),
            self.rwnd()
        );
        self.last_byte_rcvd += payload.len();
        self.delivered.extend_from_slice(&payload);
        self.expected_seq += 1;

        while let Some(buffered) = self.reorder.remove(self.expected_seq) {
            log::debug!("[rcv] drained buffered packet {}", self.expected_seq);
            self.last_byte_rcvd += buffered.len();
            self.delivered.extend_from_slice(&buffered);
            self.expected_seq += 1;
        }
    }

    fn ack_now(&mut self, dup: bool) -> Step {
        self.delayed.on_immediate_ack();
        Step::AckNow { dup }
    }

    /// The delayed-ACK deadline fired.
    pub fn on_ack_timeout(&mut self) {
        self.delayed.on_expiry();
    }

    /// One application-read tick: consume up to `app_drain_bytes` from the
    /// delivery buffer, opening receive-window space.
    pub fn drain_application(&mut self) -> usize {
        let backlog = self.last_byte_rcvd - self.last_byte_read;
        let read = backlog.min(self.cfg.app_drain_bytes);
        self.last_byte_read += read;
        if read > 0 {
            log::debug!("[rcv] application read {read} bytes");
        }
        read
    }

    /// Free receive capacity: buffer size minus unread delivered bytes minus
    /// the reorder buffer's footprint. Never overpromises.
    pub fn rwnd(&self) -> u32 {
        let used = self.last_byte_rcvd - self.last_byte_read;
        self.cfg
            .rcv_buffer
            .saturating_sub(used)
            .saturating_sub(self.reorder.byte_footprint()) as u32
    }

    /// Current cumulative ACK frame (value + advertised window).
    fn current_ack(&self) -> Ack {
        Ack {
            ack: self.last_ack_sent,
            rwnd: self.rwnd(),
        }
    }

    // Accessors used by the run loop and tests.

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn last_ack_sent(&self) -> u32 {
        self.last_ack_sent
    }

    pub fn delivered(&self) -> &[u8] {
        &self.delivered
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn pending_delayed_ack(&self) -> Option<Instant> {
        self.delayed.pending_deadline()
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Drive the engine over one half-connection until END.
    ///
    /// `reader` carries inbound DATA/PROBE/END frames; `writer` carries
    /// outbound ACKs.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<Delivery>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let mut writer = FrameWriter::new(writer);

        let (frame_tx, mut frames) = mpsc::channel::<Result<Segment>>(64);
        let pump = tokio::spawn(segment_pump(FrameReader::new(reader), frame_tx));

        let result = self.ingest_loop(&mut writer, &mut frames).await;
        pump.abort();
        result?;

        Ok(Delivery {
            bytes: self.delivered,
            stats: self.stats,
        })
    }

    async fn ingest_loop<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
        frames: &mut mpsc::Receiver<Result<Segment>>,
    ) -> Result<()> {
        let mut drain = tokio::time::interval(self.cfg.app_drain_interval);
        drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ack_timer = tokio::time::sleep(FAR_FUTURE);
        tokio::pin!(ack_timer);
        let mut ack_armed = false;

        loop {
            tokio::select! {
                inbound = frames.recv() => {
                    let segment = match inbound {
                        Some(Ok(segment)) => segment,
                        Some(Err(e)) => return Err(e),
                        None => return Err(Error::ChannelClosed),
                    };
                    match self.handle_segment(segment, Instant::now()) {
                        Step::None | Step::AckLater => {}
                        Step::AckNow { dup } => self.send_ack(writer, dup).await?,
                        Step::Finished { final_ack } => {
                            // The sender only has a 5 s window to see this,
                            // so it skips the loss simulator.
                            writer
                                .write_ack(Ack { ack: final_ack, rwnd: self.rwnd() })
                                .await?;
                            self.stats.acks_sent += 1;
                            return Ok(());
                        }
                    }
                }

                _ = drain.tick() => {
                    self.drain_application();
                }

                () = &mut ack_timer, if ack_armed => {
                    self.on_ack_timeout();
                    self.send_ack(writer, false).await?;
                }
            }

            // Keep the timer in sync with the scheduler after every event.
            match self.delayed.pending_deadline() {
                Some(deadline) => {
                    ack_timer
                        .as_mut()
                        .reset(tokio::time::Instant::from_std(deadline));
                    ack_armed = true;
                }
                None => {
                    if ack_armed {
                        ack_timer
                            .as_mut()
                            .reset(tokio::time::Instant::now() + FAR_FUTURE);
                    }
                    ack_armed = false;
                }
            }
        }
    }

    /// Emit the current cumulative ACK, subject to simulated ACK loss.
    async fn send_ack<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
        dup: bool,
    ) -> Result<()> {
        let ack = self.current_ack();
        if self.sim.drop_ack() {
            self.stats.acks_dropped += 1;
            log::debug!("[rcv] --- ACK {} LOST ---", ack.ack);
            return Ok(());
        }
        writer.write_ack(ack).await?;
        self.stats.acks_sent += 1;
        if dup {
            self.stats.dup_acks_sent += 1;
            log::debug!("[rcv] duplicate ACK {} [rwnd={}]", ack.ack, ack.rwnd);
        } else {
            log::debug!("[rcv] ACK {} [rwnd={}]", ack.ack, ack.rwnd);
        }
        Ok(())
    }
}

/// Background task decoding frames off the read half.
async fn segment_pump<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    tx: mpsc::Sender<Result<Segment>>,
) {
    loop {
        let frame = reader.read_segment().await;
        let done = frame.is_err();
        if tx.send(frame).await.is_err() || done {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
