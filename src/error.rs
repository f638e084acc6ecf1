//! Error types shared by both protocol engines.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that terminate a transfer.
///
/// Retransmission is not an error: the engines recover from simulated loss
/// indefinitely unless a retry cap is configured (see
/// [`Config::max_retransmits`](crate::config::Config::max_retransmits)).
#[derive(Error, Debug)]
pub enum Error {
    /// A frame on the byte channel was truncated or had inconsistent fields.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer disconnected mid-transfer.
    #[error("channel closed by peer")]
    ChannelClosed,

    /// The chunk source or delivery sink could not be read/written.
    #[error("file unavailable: {path}")]
    FileUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A segment exceeded the configured retransmission cap.
    #[error("transfer aborted: segment {seq} retransmitted {attempts} times")]
    TransferAborted { seq: u32, attempts: u32 },
}

impl Error {
    /// Shorthand for codec errors.
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedFrame(msg.into())
    }
}

impl From<std::io::Error> for Error {
    /// Channel I/O failures all collapse into `ChannelClosed`: the transport
    /// is assumed reliable, so any read/write error means the peer is gone.
    fn from(_: std::io::Error) -> Self {
        Error::ChannelClosed
    }
}
