//! Send-side protocol engine.
//!
//! A single cooperative loop interleaves four activities under a short
//! pacing delay: window-bounded transmission, zero-window persist probing,
//! timeout scanning, and non-blocking ACK ingestion (a background pump task
//! decodes ACK frames into a channel, so draining it never blocks the loop).
//!
//! The ACK and timeout handlers do no I/O and take an explicit clock,
//! returning actions for the loop to perform, which keeps the in-flight
//! table, the RTT estimator, and the congestion controller unit-testable.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::chunk::ChunkSource;
use crate::config::Config;
use crate::congestion::{Algorithm, CongestionController};
use crate::error::{Error, Result};
use crate::frame::{Ack, FrameReader, FrameWriter, Segment};
use crate::rtt::RttEstimator;
use crate::stats::SenderStats;

/// Pacing delay between loop iterations.
const PACING: Duration = Duration::from_millis(5);

/// How long to wait for the final ACK after END.
const FINAL_ACK_WAIT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the final ACK.
const FINAL_ACK_POLL: Duration = Duration::from_millis(10);

/// Bookkeeping for one in-flight segment.
#[derive(Debug)]
struct InFlight {
    /// Most recent transmission time.
    sent_at: Instant,
    /// Set once the segment is ever retransmitted; bars its RTT sample
    /// (Karn's rule).
    retransmitted: bool,
    /// Total transmissions of this segment.
    tx_count: u32,
}

/// What the loop must do after processing one ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckAction {
    None,
    /// Third duplicate ACK: immediately resend this sequence number.
    FastRetransmit(u32),
}

/// Send-side state for one transfer.
#[derive(Debug)]
pub struct Sender {
    cfg: Config,
    source: ChunkSource,
    total_chunks: u32,

    /// Next sequence number to assign.
    next_seq: u32,
    /// Highest sequence transmitted.
    last_byte_sent: u32,
    /// Highest sequence cumulatively acknowledged.
    last_byte_acked: u32,
    /// In-flight segments ordered by sequence number.
    unacked: BTreeMap<u32, InFlight>,

    /// Last advertised receiver window, in bytes.
    rwnd: u32,
    persist_mode: bool,
    last_probe_time: Option<Instant>,
    last_timeout_check: Option<Instant>,

    rtt: RttEstimator,
    cc: CongestionController,
    stats: SenderStats,
}

impl Sender {
    pub fn new(cfg: Config, algorithm: Algorithm, source: ChunkSource) -> Self {
        let total_chunks = source.total_chunks();
        let cc = CongestionController::new(algorithm, cfg.max_window);
        // Optimistic until the first ACK advertises the real window.
        let rwnd = cfg.rcv_buffer as u32;
        Self {
            cc,
            cfg,
            source,
            total_chunks,
            next_seq: 1,
            last_byte_sent: 0,
            last_byte_acked: 0,
            unacked: BTreeMap::new(),
            rwnd,
            persist_mode: false,
            last_probe_time: None,
            last_timeout_check: None,
            rtt: RttEstimator::new(),
            stats: SenderStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Window arithmetic
    // -----------------------------------------------------------------------

    /// `min(rwnd, cwnd)` with the advertised byte window converted to whole
    /// segments first; mixing the units here is the classic porting bug.
    pub fn effective_window(&self) -> u32 {
        let rwnd_segments = self.rwnd / self.cfg.chunk_size as u32;
        rwnd_segments.min(self.cc.cwnd())
    }

    fn in_flight(&self) -> u32 {
        self.last_byte_sent - self.last_byte_acked
    }

    fn can_transmit(&self) -> bool {
        !self.persist_mode
            && self.next_seq <= self.total_chunks
            && self.in_flight() < self.effective_window()
    }

    /// Enter persist mode when the advertised window closes.
    ///
    /// `last_probe_time` is deliberately left alone so probe spacing holds
    /// across persist episodes.
    fn update_persist(&mut self) {
        if self.rwnd == 0 && !self.persist_mode {
            self.persist_mode = true;
            log::info!("[snd] entering persist mode (rwnd=0)");
        }
    }

    // -----------------------------------------------------------------------
    // ACK handling
    // -----------------------------------------------------------------------

    fn process_ack(&mut self, ack: Ack, now: Instant) -> AckAction {
        self.rwnd = ack.rwnd;
        if self.persist_mode && self.rwnd > 0 {
            self.persist_mode = false;
            log::info!("[snd] exiting persist mode (rwnd={})", self.rwnd);
        }

        let action = if ack.ack > self.last_byte_sent {
            log::warn!(
                "[snd] ignoring ACK {} beyond last sent {}",
                ack.ack,
                self.last_byte_sent
            );
            AckAction::None
        } else if ack.ack > self.last_byte_acked {
            self.on_new_ack(ack.ack, now);
            AckAction::None
        } else if ack.ack == self.last_byte_acked && ack.ack > 0 {
            self.on_dup_ack(ack.ack)
        } else {
            AckAction::None
        };

        self.update_persist();
        action
    }

    fn on_new_ack(&mut self, ack: u32, now: Instant) {
        let newly_acked = ack - self.last_byte_acked;
        self.last_byte_acked = ack;
        self.cc.on_new_ack(ack, newly_acked);

        // RTT sample only from a segment that was never retransmitted.
        if let Some(entry) = self.unacked.get(&ack) {
            if !entry.retransmitted {
                let sample = now.duration_since(entry.sent_at);
                self.rtt.sample(sample);
                log::debug!(
                    "[snd] ACK {ack} rtt={}ms rto={}ms cwnd={} ssthresh={}",
                    sample.as_millis(),
                    self.rtt.rto().as_millis(),
                    self.cc.cwnd(),
                    self.cc.ssthresh()
                );
            }
        }

        // Everything at or below the cumulative ACK leaves the window.
        self.unacked = self.unacked.split_off(&(ack + 1));
    }

    fn on_dup_ack(&mut self, ack: u32) -> AckAction {
        let fire = self.cc.on_dup_ack(ack);
        log::debug!(
            "[snd] duplicate ACK {ack} (count {})",
            if fire { 3 } else { self.cc.dup_ack_count() }
        );
        if fire && self.unacked.contains_key(&(ack + 1)) {
            AckAction::FastRetransmit(ack + 1)
        } else {
            AckAction::None
        }
    }

    // -----------------------------------------------------------------------
    // Timeout scanning
    // -----------------------------------------------------------------------

    /// The oldest unacked segment, if its age exceeds the RTO. Scans are
    /// rate-limited to one per `timeout_check` interval.
    fn due_retransmit(&mut self, now: Instant) -> Option<u32> {
        if let Some(last) = self.last_timeout_check {
            if now.duration_since(last) < self.cfg.timeout_check {
                return None;
            }
        }
        self.last_timeout_check = Some(now);

        let (&seq, entry) = self.unacked.iter().next()?;
        let age = now.duration_since(entry.sent_at);
        if age > self.rtt.rto() {
            log::info!("[snd] timeout for packet {seq} (waited {}ms)", age.as_millis());
            Some(seq)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Transmission bookkeeping
    // -----------------------------------------------------------------------

    fn record_send(&mut self, seq: u32, now: Instant) {
        self.stats.packets_sent += 1;
        self.unacked.insert(
            seq,
            InFlight {
                sent_at: now,
                retransmitted: false,
                tx_count: 1,
            },
        );
    }

    fn record_resend(&mut self, seq: u32, now: Instant) -> Result<()> {
        self.stats.packets_sent += 1;
        self.stats.retransmissions += 1;
        let entry = match self.unacked.get_mut(&seq) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        entry.sent_at = now;
        entry.retransmitted = true;
        entry.tx_count += 1;
        if let Some(cap) = self.cfg.max_retransmits {
            if entry.tx_count > cap + 1 {
                return Err(Error::TransferAborted {
                    seq,
                    attempts: entry.tx_count,
                });
            }
        }
        Ok(())
    }

    // Accessors for tests and the front end.

    pub fn algorithm(&self) -> Algorithm {
        self.cc.algorithm()
    }

    pub fn cwnd(&self) -> u32 {
        self.cc.cwnd()
    }

    pub fn ssthresh(&self) -> u32 {
        self.cc.ssthresh()
    }

    pub fn in_fast_recovery(&self) -> bool {
        self.cc.in_fast_recovery()
    }

    pub fn persist_mode(&self) -> bool {
        self.persist_mode
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Drive the transfer to completion.
    ///
    /// `reader` carries inbound ACK frames; `writer` carries outbound
    /// DATA/PROBE/END frames.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<SenderStats>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let mut writer = FrameWriter::new(writer);

        let (ack_tx, mut acks) = mpsc::channel::<Result<Ack>>(64);
        let pump = tokio::spawn(ack_pump(FrameReader::new(reader), ack_tx));

        let result = self.transfer_loop(&mut writer, &mut acks).await;
        pump.abort();
        result?;

        log::info!(
            "[snd] transfer complete: {} chunks, {} retransmissions",
            self.total_chunks,
            self.stats.retransmissions
        );
        Ok(self.stats)
    }

    async fn transfer_loop<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
        acks: &mut mpsc::Receiver<Result<Ack>>,
    ) -> Result<()> {
        while self.last_byte_acked < self.total_chunks {
            self.fill_window(writer).await?;

            if self.persist_mode {
                self.maybe_probe(writer).await?;
            }

            if let Some(seq) = self.due_retransmit(Instant::now()) {
                self.retransmit(writer, seq).await?;
                self.cc.on_timeout();
            }

            // Drain every ACK that has already arrived, without blocking.
            loop {
                match acks.try_recv() {
                    Ok(ack) => {
                        let ack = ack?;
                        if let AckAction::FastRetransmit(seq) =
                            self.process_ack(ack, Instant::now())
                        {
                            log::info!("[snd] fast retransmit of packet {seq}");
                            self.retransmit(writer, seq).await?;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Err(Error::ChannelClosed),
                }
            }

            tokio::time::sleep(PACING).await;
        }

        self.send_end(writer, acks).await
    }

    /// Transmit new chunks while the effective window has room.
    async fn fill_window<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
    ) -> Result<()> {
        while self.can_transmit() {
            let seq = self.next_seq;
            let payload = match self.source.chunk(seq) {
                Some(payload) => payload.to_vec(),
                None => break,
            };
            log::debug!(
                "[snd] packet {seq} ({} bytes) [rwnd={} cwnd={} ssthresh={}]",
                payload.len(),
                self.rwnd,
                self.cc.cwnd(),
                self.cc.ssthresh()
            );
            writer.write_segment(&Segment::data(seq, payload)).await?;
            self.record_send(seq, Instant::now());
            self.last_byte_sent = seq;
            self.next_seq += 1;
        }
        Ok(())
    }

    /// Send a one-byte window probe, rate-limited to one per
    /// `persist_interval`. Probes never enter the in-flight table and never
    /// consume sequence space.
    async fn maybe_probe<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
    ) -> Result<()> {
        let now = Instant::now();
        let due = match self.last_probe_time {
            None => true,
            Some(last) => now.duration_since(last) >= self.cfg.persist_interval,
        };
        if due {
            writer.write_segment(&Segment::probe(self.next_seq)).await?;
            self.last_probe_time = Some(now);
            self.stats.probes_sent += 1;
            log::debug!("[snd] persist probe {} sent", self.next_seq);
        }
        Ok(())
    }

    async fn retransmit<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
        seq: u32,
    ) -> Result<()> {
        let payload = match self.source.chunk(seq) {
            Some(payload) => payload.to_vec(),
            None => return Ok(()),
        };
        log::debug!("[snd] resending packet {seq}");
        writer.write_segment(&Segment::data(seq, payload)).await?;
        self.record_resend(seq, Instant::now())
    }

    /// All chunks are acknowledged: send END and give the final ACK a short
    /// window to arrive. A missing final ACK is not an error.
    async fn send_end<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut FrameWriter<W>,
        acks: &mut mpsc::Receiver<Result<Ack>>,
    ) -> Result<()> {
        let end_seq = self.next_seq;
        writer.write_segment(&Segment::end(end_seq)).await?;
        self.stats.packets_sent += 1;
        log::info!("[snd] END packet {end_seq} sent");

        let deadline = Instant::now() + FINAL_ACK_WAIT;
        while Instant::now() < deadline {
            match acks.try_recv() {
                Ok(Ok(ack)) if ack.ack >= self.total_chunks => {
                    log::debug!("[snd] final ACK {} received", ack.ack);
                    return Ok(());
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => tokio::time::sleep(FINAL_ACK_POLL).await,
                // The peer tearing down after END is a normal close.
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        log::warn!("[snd] no final ACK within {FINAL_ACK_WAIT:?}; closing anyway");
        Ok(())
    }
}

/// Background task decoding ACK frames off the read half.
async fn ack_pump<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    tx: mpsc::Sender<Result<Ack>>,
) {
    loop {
        let ack = reader.read_ack().await;
        let done = ack.is_err();
        if tx.send(ack).await.is_err() || done {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
