//! `rft` — reliable file transfer with TCP-style flow and congestion control.
//!
//! A pedagogical transport that runs the hard parts of TCP (cumulative
//! ACKs, sliding windows, retransmission, zero-window persist probing,
//! delayed ACKs, adaptive RTT timers, and Tahoe/Reno congestion control)
//! over an ordered byte channel, with loss injected artificially so the
//! mechanisms actually fire.
//!
//! # Architecture
//!
//! ```text
//!  file bytes                                              file bytes
//!      │                                                        ▲
//!  ┌───▼─────┐  DATA/PROBE/END  ┌──────────┐   in-order     ┌───┴────┐
//!  │ chunker │──▶ Sender ──────▶│ Receiver │───────────────▶│  sink  │
//!  └─────────┘      ▲           └────┬─────┘   delivery     └────────┘
//!                   │                │
//!                   │   ACK(ack, rwnd)          loss simulated on the
//!                   └────────────────┘          data and ACK paths
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]       — wire format (serialise / deserialise, stream framing)
//! - [`sender`]      — window-bounded transmission, retransmit set, persist mode
//! - [`receiver`]    — in-order delivery, reorder buffer, rwnd, ACK generation
//! - [`congestion`]  — Tahoe/Reno congestion-control state machine
//! - [`rtt`]         — Jacobson/Karels retransmission-timeout estimation
//! - [`reorder`]     — out-of-order segment buffering
//! - [`delayed_ack`] — ACK coalescing ("every other segment or 200 ms")
//! - [`sim`]         — Bernoulli packet/ACK loss injection
//! - [`chunk`]       — file-to-chunk and bytes-to-file adapters
//! - [`config`]      — tunable protocol parameters
//! - [`stats`]       — per-transfer counters
//! - [`error`]       — transfer-terminating error kinds

pub mod chunk;
pub mod config;
pub mod congestion;
pub mod delayed_ack;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod reorder;
pub mod rtt;
pub mod sender;
pub mod sim;
pub mod stats;

pub use chunk::ChunkSource;
pub use config::Config;
pub use congestion::Algorithm;
pub use error::{Error, Result};
pub use receiver::{Delivery, Receiver};
pub use sender::Sender;
pub use sim::LossSimulator;
