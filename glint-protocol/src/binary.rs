//! Length-prefixed binary framing for the socket transport.
//!
//! Request layout:
//!
//! ```text
//! +--------------+-----------+----------------------+
//! | total_len    | command   | argument             |
//! | 4 bytes (LE) | 2 bytes   | total_len - 2 bytes  |
//! +--------------+-----------+----------------------+
//! ```
//!
//! Responses carry no command code: `[u32 LE len][payload]`.

use crate::buffer::ByteAccumulator;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the command code that leads every request payload.
pub const COMMAND_CODE_SIZE: usize = 2;

/// Command code asking the server process to exit.
pub const CMD_EXIT: u16 = 0;

/// Command code asking for a highlight.
pub const CMD_HIGHLIGHT: u16 = 1;

/// A complete request frame: the payload that followed the length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame {
    payload: Bytes,
}

impl BinaryFrame {
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Builds a request frame from a command code and its argument.
    pub fn request(command: u16, argument: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(COMMAND_CODE_SIZE + argument.len());
        payload.put_u16_le(command);
        payload.put_slice(argument);
        Self::new(payload.freeze())
    }

    /// Returns the leading little-endian command code.
    pub fn command_code(&self) -> Result<u16, ProtocolError> {
        match self.payload.get(..COMMAND_CODE_SIZE) {
            Some(code) => Ok(u16::from_le_bytes([code[0], code[1]])),
            None => Err(ProtocolError::MissingCommandCode {
                len: self.payload.len(),
            }),
        }
    }

    /// Returns the bytes after the command code (empty if the frame is too
    /// short to hold one).
    pub fn argument(&self) -> Bytes {
        if self.payload.len() < COMMAND_CODE_SIZE {
            return Bytes::new();
        }
        self.payload.slice(COMMAND_CODE_SIZE..)
    }

    /// Encodes the frame with its length prefix.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_length_prefixed(&self.payload)
    }
}

/// Encodes `payload` as `[u32 LE len][payload]`.
///
/// Used for responses, which carry no command code.
pub fn encode_length_prefixed(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    let len =
        u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32_le(len);
    buf.put_slice(payload);
    Ok(buf)
}

/// Extracts length-prefixed frames from an arbitrarily chunked stream.
#[derive(Debug, Default)]
pub struct LengthPrefixFramer {
    buffer: ByteAccumulator,
    max_frame_size: Option<usize>,
}

impl LengthPrefixFramer {
    pub fn new() -> Self {
        Self {
            buffer: ByteAccumulator::new(),
            max_frame_size: None,
        }
    }

    /// Rejects frames whose declared length exceeds `max` bytes.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.append(data);
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to extract the next request frame.
    ///
    /// Returns `Ok(None)` while the frame is incomplete; the buffer is left
    /// untouched in that case. One chunk may hold several frames, so callers
    /// loop until `None`.
    pub fn try_extract(&mut self) -> Result<Option<BinaryFrame>, ProtocolError> {
        Ok(self.try_extract_payload()?.map(BinaryFrame::new))
    }

    /// Attempts to extract the next raw `[len][payload]` payload.
    pub fn try_extract_payload(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let Some(prefix) = self.buffer.peek(LENGTH_PREFIX_SIZE) else {
            return Ok(None);
        };
        let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

        if let Some(max) = self.max_frame_size {
            if declared > max {
                return Err(ProtocolError::FrameTooLarge {
                    size: declared,
                    max,
                });
            }
        }

        let total_len = LENGTH_PREFIX_SIZE + declared;
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        self.buffer.skip(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buffer.consume(declared)))
    }
}
