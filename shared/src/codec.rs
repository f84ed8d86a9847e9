//! Length-prefixed codec for TCP framing
//!
//! All frames are laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON Frame ]
//! ```
//!
//! This ensures message boundaries are preserved over TCP streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Frame;

/// Maximum frame size (32 MB); attachments travel inline
pub const MAX_FRAME_SIZE: u32 = 32 * 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a Frame into a length-prefixed byte buffer
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a Frame directly into a provided buffer
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), CodecError> {
    let body = serde_json::to_vec(frame)?;

    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    buf.reserve(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);

    Ok(())
}

/// Take one complete frame off the front of `buf`
///
/// `Ok(None)` means more bytes are needed and leaves `buf` untouched.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if frame_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(frame_len));
    }

    let total_len = 4 + frame_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let body = buf.split_to(frame_len as usize);

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, if the buffered bytes hold one
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Bytes buffered but not yet decoded
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
