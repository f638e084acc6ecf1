//! Entry point for `rft`.
//!
//! Parses CLI arguments and dispatches into either **serve** (receiver) or
//! **send** (sender) mode. All protocol work is delegated to library
//! modules; this file owns only process setup, the TCP plumbing, the
//! filename handshake, and the statistics printout.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};

use rft::chunk::{save_delivered, ChunkSource};
use rft::frame::{FrameReader, FrameWriter};
use rft::{Algorithm, Config, LossSimulator, Receiver, Sender};

/// Reliable file transfer with TCP-style flow and congestion control.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive files: accept connections and store transferred files.
    Serve {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:2357")]
        bind: String,

        /// Directory where received files are written.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Simulated probability of dropping an inbound data packet.
        #[arg(long, default_value_t = 0.10)]
        data_loss: f64,

        /// Simulated probability of dropping an outbound ACK.
        #[arg(long, default_value_t = 0.01)]
        ack_loss: f64,

        /// Seed for the loss simulator (omit for a random seed).
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Send a file to a serving peer.
    Send {
        /// Remote server address (e.g. 127.0.0.1:2357).
        #[arg(short, long)]
        server: String,

        /// File to transfer.
        #[arg(short, long)]
        file: PathBuf,

        /// Congestion-control algorithm: tahoe or reno.
        #[arg(short, long, default_value = "tahoe")]
        algorithm: Algorithm,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().mode {
        Mode::Serve {
            bind,
            out_dir,
            data_loss,
            ack_loss,
            seed,
        } => serve(&bind, out_dir, data_loss, ack_loss, seed).await,
        Mode::Send {
            server,
            file,
            algorithm,
        } => send(&server, &file, algorithm).await,
    }
}

// ---------------------------------------------------------------------------
// Serve mode
// ---------------------------------------------------------------------------

async fn serve(
    bind: &str,
    out_dir: PathBuf,
    data_loss: f64,
    ack_loss: f64,
    seed: Option<u64>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    log::info!("server listening on {bind}");

    loop {
        let (stream, peer) = listener.accept().await.context("accepting client")?;
        log::info!("client connected from {peer}");

        let out_dir = out_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, out_dir, data_loss, ack_loss, seed).await {
                log::error!("client {peer}: {e}");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    out_dir: PathBuf,
    data_loss: f64,
    ack_loss: f64,
    seed: Option<u64>,
) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    // Filename handshake: prompt, name, ready.
    writer
        .write_string("Please enter filename to transfer:")
        .await?;
    let file_name = reader.read_string().await?;
    log::info!("client wants to transfer: {file_name}");
    writer.write_string("Ready to receive").await?;

    let cfg = Config {
        data_loss_prob: data_loss,
        ack_loss_prob: ack_loss,
        ..Config::default()
    };
    let sim = LossSimulator::from_config(&cfg, seed);

    let started = Instant::now();
    let delivery = Receiver::new(cfg, sim)
        .run(reader.into_inner(), writer.into_inner())
        .await?;

    // Strip any path components the peer may have sent.
    let base = Path::new(&file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("unnamed"));
    let out_path = out_dir.join(format!("received_{base}"));
    save_delivered(&out_path, &delivery.bytes)?;

    println!("=== Server Statistics ===");
    println!("file:                  {}", out_path.display());
    println!("bytes received:        {}", delivery.bytes.len());
    println!("{}", delivery.stats);
    println!("elapsed:               {:.1?}", started.elapsed());
    Ok(())
}

// ---------------------------------------------------------------------------
// Send mode
// ---------------------------------------------------------------------------

async fn send(server: &str, file: &Path, algorithm: Algorithm) -> Result<()> {
    let cfg = Config::default();
    let source = ChunkSource::from_file(file, cfg.chunk_size)?;
    log::info!(
        "file divided into {} chunks ({} bytes)",
        source.total_chunks(),
        source.total_bytes()
    );

    let stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("connecting to {server}"))?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let prompt = reader.read_string().await?;
    log::info!("server: {prompt}");

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("unnamed"));
    writer.write_string(&file_name).await?;

    let ready = reader.read_string().await?;
    log::info!("server: {ready}");
    log::info!("using {algorithm} congestion control");

    let total_bytes = source.total_bytes();
    let started = Instant::now();
    let stats = Sender::new(cfg, algorithm, source)
        .run(reader.into_inner(), writer.into_inner())
        .await?;

    println!("=== Transfer Statistics ===");
    println!("file:                  {file_name}");
    println!("bytes sent:            {total_bytes}");
    println!("algorithm:             {algorithm}");
    println!("{stats}");
    println!("elapsed:               {:.1?}", started.elapsed());
    Ok(())
}
