//! End-to-end transfer tests.
//!
//! Each test wires a sender engine and a receiver engine together over an
//! in-process duplex byte channel and runs both as tokio tasks, mirroring
//! how the CLI connects them over TCP.

use std::time::Duration;

use tokio::io::{duplex, split};
use tokio::time::timeout;

use rft::frame::{FrameReader, FrameWriter};
use rft::{Algorithm, ChunkSource, Config, LossSimulator, Receiver, Sender};

/// Run one full transfer and return (delivered bytes, sender stats,
/// receiver stats).
async fn transfer(
    input: &[u8],
    cfg: Config,
    algorithm: Algorithm,
    sim: LossSimulator,
) -> (Vec<u8>, rft::stats::SenderStats, rft::stats::ReceiverStats) {
    let source = ChunkSource::from_bytes(input, cfg.chunk_size);
    let sender = Sender::new(cfg.clone(), algorithm, source);
    let receiver = Receiver::new(cfg, sim);

    let (sender_end, receiver_end) = duplex(1 << 16);
    let (snd_read, snd_write) = split(sender_end);
    let (rcv_read, rcv_write) = split(receiver_end);

    let send_task = tokio::spawn(sender.run(snd_read, snd_write));
    let recv_task = tokio::spawn(receiver.run(rcv_read, rcv_write));

    let (sent, received) = tokio::join!(send_task, recv_task);
    let stats = sent.unwrap().expect("sender failed");
    let delivery = received.unwrap().expect("receiver failed");
    (delivery.bytes, stats, delivery.stats)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test]
async fn lossless_small_file() {
    let input = b"ABCDEFGHIJKLMNOPQRST"; // exactly 2 chunks of 10
    let cfg = Config {
        chunk_size: 10,
        ..Config::lossless()
    };

    let (bytes, snd, rcv) = timeout(
        Duration::from_secs(10),
        transfer(input, cfg, Algorithm::Tahoe, LossSimulator::disabled()),
    )
    .await
    .expect("transfer timed out");

    assert_eq!(bytes, input);
    assert_eq!(rcv.packets_received, 2, "exactly two DATA frames expected");
    assert_eq!(snd.retransmissions, 0);
    assert_eq!(snd.probes_sent, 0);
    assert_eq!(rcv.packets_dropped, 0);
}

#[tokio::test]
async fn lossless_delivery_is_byte_exact() {
    let input = patterned(4096);
    let cfg = Config {
        chunk_size: 64,
        ..Config::lossless()
    };

    let (bytes, snd, _) = timeout(
        Duration::from_secs(30),
        transfer(&input, cfg, Algorithm::Reno, LossSimulator::disabled()),
    )
    .await
    .expect("transfer timed out");

    assert_eq!(bytes, input);
    assert_eq!(snd.retransmissions, 0);
}

#[tokio::test]
async fn empty_file_sends_only_end() {
    let cfg = Config {
        chunk_size: 10,
        ..Config::lossless()
    };

    let (bytes, snd, rcv) = timeout(
        Duration::from_secs(10),
        transfer(b"", cfg, Algorithm::Tahoe, LossSimulator::disabled()),
    )
    .await
    .expect("transfer timed out");

    assert!(bytes.is_empty());
    assert_eq!(snd.packets_sent, 1); // just END
    assert_eq!(rcv.packets_received, 0);
}

#[tokio::test]
async fn seeded_loss_still_delivers_tahoe() {
    seeded_loss_still_delivers(Algorithm::Tahoe, 11).await;
}

#[tokio::test]
async fn seeded_loss_still_delivers_reno() {
    seeded_loss_still_delivers(Algorithm::Reno, 23).await;
}

async fn seeded_loss_still_delivers(algorithm: Algorithm, seed: u64) {
    let input = patterned(50 * 16);
    let cfg = Config {
        chunk_size: 16,
        data_loss_prob: 0.15,
        ack_loss_prob: 0.02,
        ..Config::default()
    };
    let sim = LossSimulator::seeded(0.15, 0.02, seed);

    let (bytes, snd, rcv) = timeout(
        Duration::from_secs(120),
        transfer(&input, cfg, algorithm, sim),
    )
    .await
    .expect("lossy transfer timed out");

    assert_eq!(bytes, input, "loss must never corrupt delivery");
    assert!(rcv.packets_dropped > 0, "seed produced no drops");
    assert!(
        snd.retransmissions >= rcv.packets_dropped,
        "every drop needs at least one retransmission"
    );
}

#[tokio::test]
async fn replay_with_same_seed_is_identical() {
    let input = patterned(30 * 16);
    let cfg = Config {
        chunk_size: 16,
        ..Config::default()
    };

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let sim = LossSimulator::seeded(0.10, 0.01, 99);
        let (bytes, _, _) = timeout(
            Duration::from_secs(120),
            transfer(&input, cfg.clone(), Algorithm::Reno, sim),
        )
        .await
        .expect("transfer timed out");
        outcomes.push(bytes);
    }

    assert_eq!(outcomes[0], input);
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn zero_window_forces_persist_probing() {
    // A 20-byte receive buffer holds two 10-byte chunks; the drainer frees
    // space slowly, so the sender must sit in persist mode and probe.
    let input = patterned(60); // 6 chunks
    let cfg = Config {
        chunk_size: 10,
        rcv_buffer: 20,
        persist_interval: Duration::from_millis(200),
        app_drain_interval: Duration::from_millis(500),
        app_drain_bytes: 20,
        ..Config::lossless()
    };

    let (bytes, snd, _) = timeout(
        Duration::from_secs(60),
        transfer(&input, cfg, Algorithm::Tahoe, LossSimulator::disabled()),
    )
    .await
    .expect("persist transfer timed out");

    assert_eq!(bytes, input);
    assert!(
        snd.probes_sent >= 1,
        "zero-window stall must trigger persist probes"
    );
}

#[tokio::test]
async fn handshake_then_transfer() {
    let input = patterned(256);
    let cfg = Config {
        chunk_size: 32,
        ..Config::lossless()
    };

    let (client_end, server_end) = duplex(1 << 16);
    let (client_read, client_write) = split(client_end);
    let (server_read, server_write) = split(server_end);

    let server = tokio::spawn({
        let cfg = cfg.clone();
        async move {
            let mut reader = FrameReader::new(server_read);
            let mut writer = FrameWriter::new(server_write);

            writer
                .write_string("Please enter filename to transfer:")
                .await
                .unwrap();
            let name = reader.read_string().await.unwrap();
            assert_eq!(name, "notes.txt");
            writer.write_string("Ready to receive").await.unwrap();

            Receiver::new(cfg, LossSimulator::disabled())
                .run(reader.into_inner(), writer.into_inner())
                .await
                .expect("receiver failed")
        }
    });

    let client = tokio::spawn({
        let cfg = cfg.clone();
        let input = input.clone();
        async move {
            let mut reader = FrameReader::new(client_read);
            let mut writer = FrameWriter::new(client_write);

            let prompt = reader.read_string().await.unwrap();
            assert!(prompt.contains("filename"));
            writer.write_string("notes.txt").await.unwrap();
            reader.read_string().await.unwrap();

            let source = ChunkSource::from_bytes(&input, cfg.chunk_size);
            Sender::new(cfg, Algorithm::Reno, source)
                .run(reader.into_inner(), writer.into_inner())
                .await
                .expect("sender failed")
        }
    });

    let (delivery, _) = timeout(Duration::from_secs(30), async {
        let (d, s) = tokio::join!(server, client);
        (d.unwrap(), s.unwrap())
    })
    .await
    .expect("handshake transfer timed out");

    assert_eq!(delivery.bytes, input);
}

#[tokio::test]
async fn sender_errors_when_peer_vanishes() {
    let cfg = Config {
        chunk_size: 10,
        ..Config::lossless()
    };
    let source = ChunkSource::from_bytes(&patterned(100), cfg.chunk_size);
    let sender = Sender::new(cfg, Algorithm::Tahoe, source);

    let (sender_end, receiver_end) = duplex(1 << 16);
    drop(receiver_end);
    let (snd_read, snd_write) = split(sender_end);

    let err = timeout(Duration::from_secs(10), sender.run(snd_read, snd_write))
        .await
        .expect("should fail fast")
        .unwrap_err();
    assert!(matches!(err, rft::Error::ChannelClosed));
}
