//! # glint-protocol
//!
//! Wire protocols spoken by the glint highlighting service.
//!
//! This crate provides:
//! - A FIFO byte accumulator for chunked input
//! - Length-prefixed binary frames (socket transport)
//! - Header-block frames with an optional sized body (pipe transport)

pub mod binary;
pub mod buffer;
pub mod error;
pub mod header;

pub use binary::{encode_length_prefixed, BinaryFrame, LengthPrefixFramer, CMD_EXIT, CMD_HIGHLIGHT};
pub use buffer::ByteAccumulator;
pub use error::ProtocolError;
pub use header::{DeclaredLength, HeaderBlockFramer, HeaderFrame, HeaderMap};

/// Default TCP port of the binary transport.
pub const DEFAULT_PORT: u16 = 7411;

/// Default cap on buffered, not yet framed bytes per stream (16 MiB).
pub const DEFAULT_MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;
