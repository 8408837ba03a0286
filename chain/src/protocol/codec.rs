//! Frame codec for the message bus.
//!
//! Envelopes travel as length-prefixed frames: a little-endian `u32`
//! length followed by the canonical bincode-2 encoding of the
//! [`Envelope`](super::Envelope). The length prefix is bounded by
//! [`MAX_FRAME_LEN`] so a malformed peer cannot make a receiver allocate
//! unbounded memory.

use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::Envelope;

/// Upper bound on the body size of a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors produced while encoding, decoding, or transporting frames.
#[derive(Debug)]
pub enum CodecError {
    /// Underlying socket error.
    Io(std::io::Error),
    /// The envelope could not be encoded.
    Encode(String),
    /// The frame body could not be decoded into an envelope.
    Decode(String),
    /// The announced frame length exceeds [`MAX_FRAME_LEN`].
    FrameTooLarge(usize),
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "io error: {e}"),
            CodecError::Encode(msg) => write!(f, "encode error: {msg}"),
            CodecError::Decode(msg) => write!(f, "decode error: {msg}"),
            CodecError::FrameTooLarge(len) => {
                write!(f, "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Encodes an envelope into a complete frame (length prefix included).
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let cfg = bincode::config::standard();
    let body =
        bincode::serde::encode_to_vec(envelope, cfg).map_err(|e| CodecError::Encode(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body (without the length prefix) into an envelope.
pub fn decode_envelope(body: &[u8]) -> Result<Envelope, CodecError> {
    let cfg = bincode::config::standard();
    let (envelope, _): (Envelope, usize) =
        bincode::serde::decode_from_slice(body, cfg).map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(envelope)
}

/// Writes one envelope as a frame onto an async stream.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> Result<(), CodecError>
where
    W: AsyncWriteExt + Unpin,
{
    let frame = encode_envelope(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame from an async stream.
///
/// Returns `Ok(None)` on a clean end-of-stream before the length prefix.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Envelope>, CodecError>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_envelope(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, Payload};

    #[test]
    fn frame_roundtrip() {
        let envelope = Envelope::new(MessageType::ProtectReject, "127.0.0.1:9001", Payload::Empty);
        let frame = encode_envelope(&envelope).expect("encode");

        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded = decode_envelope(&frame[4..]).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes());
        frame.extend_from_slice(&[0u8; 8]);

        let mut reader = std::io::Cursor::new(frame);
        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(read_frame(&mut reader));
        assert!(matches!(result, Err(CodecError::FrameTooLarge(_))));
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let result = decode_envelope(&[0xFF, 0xFE, 0xFD]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut reader = std::io::Cursor::new(Vec::<u8>::new());
        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(read_frame(&mut reader));
        assert!(matches!(result, Ok(None)));
    }
}
