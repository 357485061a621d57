//! Byte accumulator shared by both framers.
//!
//! Bytes are appended at the tail and removed from the head. Nothing in
//! between is ever reordered or rewritten.

use bytes::{Buf, Bytes, BytesMut};

/// Initial capacity of a fresh accumulator (8 KiB).
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Growing FIFO byte buffer with cursor-style head access.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    buffer: BytesMut,
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends a chunk to the tail.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the first `n` bytes without consuming them, or `None` if fewer
    /// than `n` bytes are buffered.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.buffer.get(..n)
    }

    /// Removes the first `n` bytes and returns them without copying.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered. Framers only consume
    /// after checking `len()`.
    pub fn consume(&mut self, n: usize) -> Bytes {
        self.buffer.split_to(n).freeze()
    }

    /// Drops the first `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.buffer.advance(n);
    }

    /// Returns every buffered byte.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_consume_fifo() {
        let mut acc = ByteAccumulator::new();
        acc.append(b"hello ");
        acc.append(b"world");
        assert_eq!(acc.len(), 11);

        assert_eq!(acc.consume(5).as_ref(), b"hello");
        assert_eq!(acc.as_slice(), b" world");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut acc = ByteAccumulator::new();
        acc.append(b"abc");

        assert_eq!(acc.peek(2), Some(&b"ab"[..]));
        assert_eq!(acc.peek(3), Some(&b"abc"[..]));
        assert_eq!(acc.peek(4), None);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn test_skip() {
        let mut acc = ByteAccumulator::default();
        assert!(acc.is_empty());

        acc.append(b"0123456789");
        acc.skip(4);
        assert_eq!(acc.as_slice(), b"456789");

        acc.skip(6);
        assert!(acc.is_empty());
    }
}
