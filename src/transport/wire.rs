//! Wire protocol: length-prefixed JSON framing
//!
//! Wire format:  [4-byte big-endian length][JSON payload]
//!
//! Framing and decoding are separate steps so a frame that does not decode
//! can be dropped without losing the stream.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::Message;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 1024 * 1024;

/// Serialize a message into a JSON payload
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(msg)?)
}

/// Parse a JSON payload into a message, rejecting missing or mistyped fields
pub fn decode(payload: &[u8]) -> Result<Message> {
    serde_json::from_slice(payload).map_err(|e| Error::malformed(e.to_string()))
}

/// Read one frame's payload from a stream
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R, max_len: u32) -> Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    if len > max_len {
        return Err(Error::FrameTooLarge {
            size: len,
            max: max_len,
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one frame to a stream
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })?;

    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
