//! Coordinator/worker wire protocol
//!
//! Every discrete protocol field travels as its own frame, mirroring one
//! point-to-point send: the receiver performs exactly one read per field the
//! sender writes. Frames use MessagePack (rmp-serde) bodies.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                          Worker (rank r)
//!     |                                   |
//!     |--- WORK(assignment) ------------->|
//!     |                                   |  simulate + analyze
//!     |<-- RESULT(count) -----------------|  (or FATAL_ERROR(text))
//!     |<-- RESULT(name length) -----------|
//!     |<-- RESULT(name bytes) ------------|  repeated per parameter
//!     |<-- RESULT(stats mask) ------------|
//!     |<-- RESULT(scalar) ... ------------|  one per masked scalar
//!     |<-- RESULT(grid count, grid) ------|  if NORM
//! ```
//!
//! # Message Framing
//!
//! Each frame is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: body length][N bytes: MessagePack envelope]
//! ```

use crate::plan::WorkAssignment;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Status code a worker sends instead of its results when it cannot finish
pub const FATAL_ERROR: u8 = 0x25;

/// Frame tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Tag {
    /// Coordinator to worker assignment
    Work = 0,
    /// Worker to coordinator result field
    Result = 1,
    /// Worker failure status
    FatalError = FATAL_ERROR,
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> u8 {
        tag as u8
    }
}

impl TryFrom<u8> for Tag {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Tag::Work),
            1 => Ok(Tag::Result),
            FATAL_ERROR => Ok(Tag::FatalError),
            other => Err(format!("unknown frame tag 0x{:02x}", other)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Work => write!(f, "WORK"),
            Tag::Result => write!(f, "RESULT"),
            Tag::FatalError => write!(f, "FATAL_ERROR"),
        }
    }
}

/// Work assignment sent to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,
    /// Processes in the run, coordinator included
    pub world_size: u32,
    pub assignment: WorkAssignment,
}

/// One discrete protocol field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Assignment(AssignmentMessage),
    Count(u32),
    Bytes(Vec<u8>),
    Scalar(f64),
    Scalars(Vec<f64>),
}

impl Field {
    /// Variant name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Field::Assignment(_) => "assignment",
            Field::Count(_) => "count",
            Field::Bytes(_) => "bytes",
            Field::Scalar(_) => "scalar",
            Field::Scalars(_) => "scalars",
        }
    }
}

/// Frame body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: Tag,
    pub field: Field,
}

impl Envelope {
    pub fn work(assignment: AssignmentMessage) -> Self {
        Self {
            tag: Tag::Work,
            field: Field::Assignment(assignment),
        }
    }

    pub fn result(field: Field) -> Self {
        Self {
            tag: Tag::Result,
            field,
        }
    }

    /// FATAL_ERROR status carrying a UTF-8 description
    pub fn fatal(message: &str) -> Self {
        Self {
            tag: Tag::FatalError,
            field: Field::Bytes(message.as_bytes().to_vec()),
        }
    }
}

/// Serialize an envelope to a length-prefixed frame
pub fn serialize_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(envelope).context("Failed to serialize frame")?;

    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);

    Ok(framed)
}

/// Deserialize one frame from the front of `buf`
///
/// Returns (envelope, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_envelope(buf: &[u8]) -> Result<(Envelope, usize)> {
    if buf.len() < 4 {
        anyhow::bail!("Buffer too small for frame length (need 4 bytes, got {})", buf.len());
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("Frame too large: {} bytes (max {})", len, MAX_FRAME_LEN);
    }
    if buf.len() < 4 + len {
        anyhow::bail!("Incomplete frame (need {} bytes, got {})", 4 + len, buf.len());
    }

    let envelope = rmp_serde::from_slice(&buf[4..4 + len]).context("Failed to deserialize frame")?;

    Ok((envelope, 4 + len))
}

/// Read one frame
pub async fn read_envelope<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Envelope> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read frame length")?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("Frame too large: {} bytes (max {})", len, MAX_FRAME_LEN);
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .context("Failed to read frame body")?;

    rmp_serde::from_slice(&body).context("Failed to deserialize frame")
}

/// Write one frame and flush
pub async fn write_envelope<W: AsyncWrite + Unpin>(stream: &mut W, envelope: &Envelope) -> Result<()> {
    write_envelopes(stream, std::slice::from_ref(envelope)).await
}

/// Write a sequence of frames in order, then flush once
pub async fn write_envelopes<W: AsyncWrite + Unpin>(stream: &mut W, envelopes: &[Envelope]) -> Result<()> {
    for envelope in envelopes {
        let framed = serialize_envelope(envelope)?;
        stream
            .write_all(&framed)
            .await
            .context("Failed to write frame")?;
    }

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> AssignmentMessage {
        AssignmentMessage {
            protocol_version: PROTOCOL_VERSION,
            world_size: 4,
            assignment: WorkAssignment {
                rank: 3,
                perturbation: -1.0,
            },
        }
    }

    #[test]
    fn test_serialize_deserialize_work() {
        let envelope = Envelope::work(assignment());

        let bytes = serialize_envelope(&envelope).unwrap();
        let (decoded, consumed) = deserialize_envelope(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.tag, Tag::Work);
        match decoded.field {
            Field::Assignment(msg) => {
                assert_eq!(msg.world_size, 4);
                assert_eq!(msg.assignment.rank, 3);
                assert_eq!(msg.assignment.perturbation, -1.0);
            }
            _ => panic!("Wrong field type"),
        }
    }

    #[test]
    fn test_serialize_deserialize_fatal() {
        let bytes = serialize_envelope(&Envelope::fatal("simulator crashed")).unwrap();
        let (decoded, _) = deserialize_envelope(&bytes).unwrap();

        assert_eq!(decoded.tag, Tag::FatalError);
        assert_eq!(decoded.field, Field::Bytes(b"simulator crashed".to_vec()));
    }

    #[test]
    fn test_scalar_bit_exact() {
        let value = 0.1f64 + 0.2f64;
        let bytes = serialize_envelope(&Envelope::result(Field::Scalar(value))).unwrap();
        let (decoded, _) = deserialize_envelope(&bytes).unwrap();

        match decoded.field {
            Field::Scalar(v) => assert_eq!(v.to_bits(), value.to_bits()),
            _ => panic!("Wrong field type"),
        }
    }

    #[test]
    fn test_tag_codes() {
        assert_eq!(u8::from(Tag::Work), 0);
        assert_eq!(u8::from(Tag::Result), 1);
        assert_eq!(u8::from(Tag::FatalError), 0x25);
        assert_eq!(Tag::try_from(0x25).unwrap(), Tag::FatalError);
        assert!(Tag::try_from(7).is_err());
    }

    #[test]
    fn test_message_framing() {
        let bytes = serialize_envelope(&Envelope::result(Field::Count(3))).unwrap();

        assert!(bytes.len() >= 4);
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + len);
    }

    #[test]
    fn test_incomplete_and_oversized() {
        let bytes = serialize_envelope(&Envelope::result(Field::Count(3))).unwrap();
        assert!(deserialize_envelope(&bytes[..bytes.len() - 1]).is_err());
        assert!(deserialize_envelope(&bytes[..2]).is_err());

        let mut huge = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes().to_vec();
        huge.extend_from_slice(&[0u8; 8]);
        assert!(deserialize_envelope(&huge).is_err());
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);

        let frames = vec![
            Envelope::result(Field::Count(1)),
            Envelope::result(Field::Bytes(b"PERM\0".to_vec())),
            Envelope::result(Field::Scalars(vec![1.0, 2.0, 3.0])),
        ];
        write_envelopes(&mut tx, &frames).await.unwrap();

        for expected in &frames {
            let got = read_envelope(&mut rx).await.unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_frame() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(&((MAX_FRAME_LEN + 1) as u32).to_le_bytes()).await.unwrap();

        let err = read_envelope(&mut rx).await.unwrap_err();
        assert!(err.to_string().contains("Frame too large"));
    }

    #[tokio::test]
    async fn test_read_on_closed_stream() {
        let (tx, mut rx) = tokio::io::duplex(64);
        drop(tx);
        assert!(read_envelope(&mut rx).await.is_err());
    }
}
