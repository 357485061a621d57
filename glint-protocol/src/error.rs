//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while framing a byte stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed header block: first header must be '$rq', got {found:?}")]
    MalformedHeader { found: String },

    #[error("header {name:?} cannot be encoded")]
    InvalidHeader { name: String },

    #[error("frame too short for a command code: {len} bytes")]
    MissingCommandCode { len: usize },

    #[error("payload too large to encode: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether the stream can keep being framed after this error.
    ///
    /// A malformed header block is discarded by the framer, so the next
    /// frame can still be read. Every other error leaves the stream in an
    /// unknown state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::MalformedHeader { .. })
    }
}
