//! Wire-format definitions and stream framing.
//!
//! Both directions of a connection carry framed messages over an ordered
//! byte channel:
//!
//! ```text
//! data-bearing frame:  seq (i32 BE) | length (i32 BE) | is_probe (u8) | payload[length]
//! ACK frame:           ack (i32 BE) | rwnd (i32 BE)
//! ```
//!
//! An END is a data frame with `length = 0` and `is_probe = 0`; a PROBE
//! carries exactly one payload byte. The codec itself is stateless: pure
//! data transformation plus thin async read/write wrappers. No protocol
//! logic lives here.

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Fixed part of a data-bearing frame: seq + length + is_probe.
pub const SEGMENT_HEADER_LEN: usize = 9;

/// Size of an ACK frame on the wire.
pub const ACK_FRAME_LEN: usize = 8;

/// Upper bound on a decoded payload; anything larger is treated as a framing
/// error rather than an allocation request.
const MAX_PAYLOAD: usize = 64 * 1024;

/// Role of a data-bearing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Ordinary payload-carrying segment.
    Data,
    /// One-byte zero-window probe; does not consume sequence space.
    Probe,
    /// End-of-stream marker; zero payload.
    End,
}

/// A unit of transmission from sender to receiver.
///
/// `seq` is a chunk index (1-based), not a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: u32,
    pub kind: SegmentKind,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            kind: SegmentKind::Data,
            payload,
        }
    }

    pub fn probe(seq: u32) -> Self {
        Self {
            seq,
            kind: SegmentKind::Probe,
            payload: vec![0],
        }
    }

    pub fn end(seq: u32) -> Self {
        Self {
            seq,
            kind: SegmentKind::End,
            payload: Vec::new(),
        }
    }

    /// Serialise into a newly allocated buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SEGMENT_HEADER_LEN + self.payload.len());
        buf.put_i32(self.seq as i32);
        buf.put_i32(self.payload.len() as i32);
        buf.put_u8(matches!(self.kind, SegmentKind::Probe) as u8);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a segment from a buffer holding exactly one frame.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < SEGMENT_HEADER_LEN {
            return Err(Error::malformed(format!(
                "segment header truncated at {} bytes",
                buf.len()
            )));
        }
        let seq = buf.get_i32();
        let len = buf.get_i32();
        let is_probe = buf.get_u8();
        let (seq, len) = validate_header(seq, len, is_probe)?;
        if buf.remaining() != len {
            return Err(Error::malformed(format!(
                "payload length {} does not match remaining {} bytes",
                len,
                buf.remaining()
            )));
        }
        Ok(classify(seq, is_probe, buf.to_vec()))
    }
}

/// A cumulative acknowledgement with the receiver's advertised window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Highest in-order sequence number accepted; 0 means "nothing yet".
    pub ack: u32,
    /// Free receive capacity, in bytes.
    pub rwnd: u32,
}

impl Ack {
    pub fn encode(&self) -> [u8; ACK_FRAME_LEN] {
        let mut buf = [0u8; ACK_FRAME_LEN];
        buf[..4].copy_from_slice(&(self.ack as i32).to_be_bytes());
        buf[4..].copy_from_slice(&(self.rwnd as i32).to_be_bytes());
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() != ACK_FRAME_LEN {
            return Err(Error::malformed(format!(
                "ACK frame is {} bytes, expected {ACK_FRAME_LEN}",
                buf.len()
            )));
        }
        let ack = buf.get_i32();
        let rwnd = buf.get_i32();
        if ack < 0 {
            return Err(Error::malformed(format!("negative ack {ack}")));
        }
        if rwnd < 0 {
            return Err(Error::malformed(format!("negative rwnd {rwnd}")));
        }
        Ok(Self {
            ack: ack as u32,
            rwnd: rwnd as u32,
        })
    }
}

fn validate_header(seq: i32, len: i32, is_probe: u8) -> Result<(u32, usize)> {
    if seq < 0 {
        return Err(Error::malformed(format!("negative seq {seq}")));
    }
    if len < 0 || len as usize > MAX_PAYLOAD {
        return Err(Error::malformed(format!("implausible payload length {len}")));
    }
    if is_probe > 1 {
        return Err(Error::malformed(format!("bad probe flag {is_probe}")));
    }
    if is_probe == 1 && len != 1 {
        return Err(Error::malformed(format!("probe with {len}-byte payload")));
    }
    Ok((seq as u32, len as usize))
}

fn classify(seq: u32, is_probe: u8, payload: Vec<u8>) -> Segment {
    let kind = if is_probe == 1 {
        SegmentKind::Probe
    } else if payload.is_empty() {
        SegmentKind::End
    } else {
        SegmentKind::Data
    };
    Segment { seq, kind, payload }
}

// ---------------------------------------------------------------------------
// Stream framing
// ---------------------------------------------------------------------------

/// Reads frames off one half of the byte channel.
///
/// EOF at a frame boundary is reported as [`Error::ChannelClosed`]; EOF in
/// the middle of a frame is a truncation and reported as `MalformedFrame`.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the underlying read half.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the next data-bearing frame (DATA, PROBE, or END).
    pub async fn read_segment(&mut self) -> Result<Segment> {
        let mut header = [0u8; SEGMENT_HEADER_LEN];
        self.inner
            .read_exact(&mut header)
            .await
            .map_err(|_| Error::ChannelClosed)?;

        let seq = i32::from_be_bytes(header[0..4].try_into().unwrap());
        let len = i32::from_be_bytes(header[4..8].try_into().unwrap());
        let is_probe = header[8];
        let (seq, len) = validate_header(seq, len, is_probe)?;

        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|_| Error::malformed("payload truncated"))?;
        Ok(classify(seq, is_probe, payload))
    }

    /// Read the next ACK frame.
    pub async fn read_ack(&mut self) -> Result<Ack> {
        let mut buf = [0u8; ACK_FRAME_LEN];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ack::decode(&buf)
    }

    /// Read a length-prefixed UTF-8 string (u16 BE length), as used by the
    /// initial filename exchange.
    pub async fn read_string(&mut self) -> Result<String> {
        let len = self
            .inner
            .read_u16()
            .await
            .map_err(|_| Error::ChannelClosed)?;
        let mut buf = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|_| Error::malformed("string truncated"))?;
        String::from_utf8(buf).map_err(|_| Error::malformed("string is not UTF-8"))
    }
}

/// Writes frames onto one half of the byte channel.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the underlying write half.
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub async fn write_segment(&mut self, segment: &Segment) -> Result<()> {
        self.inner.write_all(&segment.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_ack(&mut self, ack: Ack) -> Result<()> {
        self.inner.write_all(&ack.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string (u16 BE length).
    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        debug_assert!(s.len() <= u16::MAX as usize);
        self.inner.write_u16(s.len() as u16).await?;
        self.inner.write_all(s.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let seg = Segment::data(7, b"hello".to_vec());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
    }

    #[test]
    fn probe_roundtrip() {
        let seg = Segment::probe(12);
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.kind, SegmentKind::Probe);
        assert_eq!(decoded.seq, 12);
        assert_eq!(decoded.payload.len(), 1);
    }

    #[test]
    fn end_roundtrip() {
        let seg = Segment::end(42);
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.kind, SegmentKind::End);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn ack_roundtrip() {
        let ack = Ack { ack: 9, rwnd: 262_144 };
        assert_eq!(Ack::decode(&ack.encode()).unwrap(), ack);
    }

    #[test]
    fn truncated_header_rejected() {
        let err = Segment::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut bytes = Segment::data(1, b"abcd".to_vec()).encode();
        bytes.truncate(bytes.len() - 2);
        let err = Segment::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn negative_length_rejected() {
        let mut buf = Vec::new();
        buf.put_i32(1);
        buf.put_i32(-5);
        buf.put_u8(0);
        assert!(Segment::decode(&buf).is_err());
    }

    #[test]
    fn oversized_probe_rejected() {
        let mut buf = Vec::new();
        buf.put_i32(1);
        buf.put_i32(3);
        buf.put_u8(1);
        buf.put_slice(b"abc");
        assert!(Segment::decode(&buf).is_err());
    }

    #[test]
    fn negative_rwnd_rejected() {
        let mut buf = Vec::new();
        buf.put_i32(1);
        buf.put_i32(-1);
        assert!(Ack::decode(&buf).is_err());
    }

    #[tokio::test]
    async fn stream_framing_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        writer.write_string("video.mp4").await.unwrap();
        writer
            .write_segment(&Segment::data(1, b"payload".to_vec()))
            .await
            .unwrap();
        writer.write_segment(&Segment::end(2)).await.unwrap();

        assert_eq!(reader.read_string().await.unwrap(), "video.mp4");
        let seg = reader.read_segment().await.unwrap();
        assert_eq!(seg.seq, 1);
        assert_eq!(seg.payload, b"payload");
        let end = reader.read_segment().await.unwrap();
        assert_eq!(end.kind, SegmentKind::End);
    }

    #[tokio::test]
    async fn eof_at_boundary_is_channel_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server);
        assert!(matches!(
            reader.read_segment().await.unwrap_err(),
            Error::ChannelClosed
        ));
    }
}
