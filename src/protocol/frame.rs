//! Wire framing: a fixed 16-byte little-endian header followed by the raw
//! payload bytes.
//!
//! Header layout: `{i32 source, i32 tag, i32 length, i32 reserved}`. The
//! reserved word is zeroed on send and ignored on receive. The payload is an
//! uninterpreted byte copy of the sender's buffer.

use crate::types::{Rank, Tag};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 16;

/// Largest payload a frame may declare.
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub source: Rank,
    pub tag: Tag,
    pub len: i32,
}

impl FrameHeader {
    /// Encode into the 16-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.source.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        // buf[12..16] stays zero: reserved.
        buf
    }

    /// Decode from the 16-byte wire form.
    ///
    /// A negative declared length means a corrupted or hostile stream; the
    /// reserved word is not inspected.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> std::io::Result<Self> {
        let source = i32::from_le_bytes(buf[0..4].try_into().expect("4-byte slice"));
        let tag = i32::from_le_bytes(buf[4..8].try_into().expect("4-byte slice"));
        let len = i32::from_le_bytes(buf[8..12].try_into().expect("4-byte slice"));
        if len < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame header declares negative payload length {len}"),
            ));
        }
        Ok(Self { source, tag, len })
    }
}

/// One message as it travels between the transport and the match engine.
#[derive(Debug)]
pub struct Frame {
    pub source: Rank,
    /// Wire tag: the communicator's window base plus the caller's tag.
    pub tag: Tag,
    pub payload: Vec<u8>,
}

/// Read one frame from a stream.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary. An EOF inside a
/// frame, or a header failing validation, is an error.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Frame>>
where
    R: AsyncReadExt + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        source: header.source,
        tag: header.tag,
        payload,
    }))
}

/// Write one frame to a stream: header, payload, flush.
///
/// The caller is responsible for serializing concurrent writers so frames
/// are never interleaved on the wire.
pub async fn write_frame<W>(
    writer: &mut W,
    source: Rank,
    tag: Tag,
    payload: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
    let header = FrameHeader {
        source,
        tag,
        len: payload.len() as i32,
    };
    writer.write_all(&header.encode()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
