//! Header-block framing for the pipe transport.
//!
//! ```text
//! $rq: /highlight\r\n
//! lang: lua\r\n
//! $length: 8\r\n
//! \r\n
//! print(1)
//! ```
//!
//! A frame is a block of `name: value` lines closed by an empty line,
//! followed by exactly `$length` body bytes when that header is present.

use crate::buffer::ByteAccumulator;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Sequence closing a header block.
pub const HEADER_DELIMITER: &[u8; 4] = b"\r\n\r\n";

/// Reserved name every frame must start with; its value is the route.
pub const ROUTE_HEADER: &str = "$rq";

/// Reserved name declaring the body length in bytes.
pub const LENGTH_HEADER: &str = "$length";

/// Interpretation of the `$length` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredLength {
    /// No `$length` header; the frame has no body.
    Absent,
    /// Present but not a decimal byte count.
    Invalid(String),
    /// Body length in bytes.
    Bytes(usize),
}

/// Ordered header collection.
///
/// Lookups are by exact (case-sensitive) name. Inserting an existing name
/// replaces its value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first header in insertion order.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.entries
            .first()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interprets the `$length` header.
    pub fn declared_length(&self) -> DeclaredLength {
        match self.get(LENGTH_HEADER) {
            None => DeclaredLength::Absent,
            Some(value) => match value.parse::<usize>() {
                Ok(n) => DeclaredLength::Bytes(n),
                Err(_) => DeclaredLength::Invalid(value.to_string()),
            },
        }
    }
}

/// A complete header-block frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFrame {
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HeaderFrame {
    /// Creates a frame addressed to `route`.
    pub fn new(route: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ROUTE_HEADER, route);
        Self {
            headers,
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the `$rq` value.
    pub fn route(&self) -> Option<&str> {
        self.headers.get(ROUTE_HEADER)
    }

    /// Serializes the frame to wire bytes.
    ///
    /// `$rq` is written first and `$length` is derived from the body, so a
    /// stale `$length` header is never emitted. Empty names, names
    /// containing `:` and names or values containing CR or LF would decode
    /// differently, so they are rejected.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        for (name, value) in self.headers.iter() {
            if name.is_empty() || name.contains(':') || has_line_break(name) || has_line_break(value) {
                return Err(ProtocolError::InvalidHeader {
                    name: name.to_string(),
                });
            }
        }

        let body_len = self.body.as_ref().map_or(0, |b| b.len());
        let mut buf = BytesMut::with_capacity(64 + body_len);

        put_header(&mut buf, ROUTE_HEADER, self.route().unwrap_or_default());
        for (name, value) in self.headers.iter() {
            if name == ROUTE_HEADER || name == LENGTH_HEADER {
                continue;
            }
            put_header(&mut buf, name, value);
        }

        match &self.body {
            Some(body) => {
                put_header(&mut buf, LENGTH_HEADER, &body.len().to_string());
                buf.put_slice(b"\r\n");
                buf.put_slice(body);
            }
            None => buf.put_slice(b"\r\n"),
        }
        Ok(buf)
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

/// Parses a header block (the bytes before the delimiter).
fn parse_header_block(block: &[u8]) -> HeaderMap {
    let text = String::from_utf8_lossy(block);
    let mut headers = HeaderMap::new();
    for line in text.split("\r\n") {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.trim()),
            None => (line, ""),
        };
        headers.insert(name, value);
    }
    headers
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_DELIMITER.len())
        .position(|w| w == HEADER_DELIMITER)
}

/// Extracts header-block frames from an arbitrarily chunked stream.
///
/// Each call re-scans from the start of the buffer; no parse state is kept
/// besides the buffered bytes.
#[derive(Debug, Default)]
pub struct HeaderBlockFramer {
    buffer: ByteAccumulator,
    max_frame_size: Option<usize>,
}

impl HeaderBlockFramer {
    pub fn new() -> Self {
        Self {
            buffer: ByteAccumulator::new(),
            max_frame_size: None,
        }
    }

    /// Rejects header blocks and bodies larger than `max` bytes.
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

    /// Attempts to extract the next frame.
    ///
    /// Returns `Ok(None)` without touching the buffer while the header block
    /// or the declared body is incomplete. A block whose first header is not
    /// `$rq` is discarded (through its delimiter) and reported as
    /// [`ProtocolError::MalformedHeader`].
    pub fn try_extract(&mut self) -> Result<Option<HeaderFrame>, ProtocolError> {
        let Some(header_end) = find_delimiter(self.buffer.as_slice()) else {
            self.check_limit(self.buffer.len())?;
            return Ok(None);
        };

        let headers = parse_header_block(&self.buffer.as_slice()[..header_end]);
        let block_len = header_end + HEADER_DELIMITER.len();

        let first = headers.first().map(|(name, _)| name).unwrap_or_default();
        if first != ROUTE_HEADER {
            let found = first.to_string();
            self.buffer.skip(block_len);
            return Err(ProtocolError::MalformedHeader { found });
        }

        let body_len = match headers.declared_length() {
            DeclaredLength::Bytes(n) => Some(n),
            DeclaredLength::Absent | DeclaredLength::Invalid(_) => None,
        };
        let frame_len = match body_len {
            Some(n) => {
                self.check_limit(n)?;
                block_len
                    .checked_add(n)
                    .ok_or(ProtocolError::FrameTooLarge {
                        size: n,
                        max: usize::MAX - block_len,
                    })?
            }
            None => block_len,
        };

        if self.buffer.len() < frame_len {
            return Ok(None);
        }

        self.buffer.skip(block_len);
        let body = body_len.map(|n| self.buffer.consume(n));
        Ok(Some(HeaderFrame { headers, body }))
    }

    fn check_limit(&self, size: usize) -> Result<(), ProtocolError> {
        match self.max_frame_size {
            Some(max) if size > max => Err(ProtocolError::FrameTooLarge { size, max }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LUA_REQUEST: &[u8] = b"$rq: /highlight\r\nlang: lua\r\n$length: 8\r\n\r\nprint(1)";

    #[test]
    fn test_extract_with_body() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(LUA_REQUEST);

        let frame = framer.try_extract().unwrap().unwrap();
        assert_eq!(frame.route(), Some("/highlight"));
        assert_eq!(frame.headers.get("lang"), Some("lua"));
        assert_eq!(frame.headers.declared_length(), DeclaredLength::Bytes(8));
        assert_eq!(frame.body.as_deref(), Some(&b"print(1)"[..]));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_extract_without_body() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq: /ping\r\nrid: 7\r\n\r\nleftover");

        let frame = framer.try_extract().unwrap().unwrap();
        assert_eq!(frame.route(), Some("/ping"));
        assert_eq!(frame.headers.get("rid"), Some("7"));
        assert!(frame.body.is_none());
        assert_eq!(framer.buffered(), "leftover".len());
    }

    #[test]
    fn test_every_prefix_needs_more_data() {
        for split in 0..LUA_REQUEST.len() {
            let mut framer = HeaderBlockFramer::new();
            framer.extend(&LUA_REQUEST[..split]);
            assert!(framer.try_extract().unwrap().is_none(), "split at {split}");
            assert_eq!(framer.buffered(), split, "buffer mutated at {split}");

            framer.extend(&LUA_REQUEST[split..]);
            let frame = framer.try_extract().unwrap().unwrap();
            assert_eq!(frame.body.as_deref(), Some(&b"print(1)"[..]));
        }
    }

    #[test]
    fn test_line_parsing_rules() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq:   /a:b  \r\nflag\r\nx:1\r\nx: 2\r\n\r\n");

        let frame = framer.try_extract().unwrap().unwrap();
        // value keeps everything after the first colon, trimmed
        assert_eq!(frame.route(), Some("/a:b"));
        // no colon -> empty value
        assert_eq!(frame.headers.get("flag"), Some(""));
        // duplicates overwrite in place
        assert_eq!(frame.headers.get("x"), Some("2"));
        let names: Vec<_> = frame.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["$rq", "flag", "x"]);
    }

    #[test]
    fn test_header_names_are_case_sensitive() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$RQ: /highlight\r\n\r\n");
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::MalformedHeader { found }) if found == "$RQ"
        ));
    }

    #[test]
    fn test_length_counts_bytes_not_content() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq: /highlight\r\nlang: lua\r\n$length: 10\r\n\r\nprint(1)\n");
        // 9 of 10 body bytes
        assert!(framer.try_extract().unwrap().is_none());

        // the 10th byte belongs to the next frame
        framer.extend(b"$rq: /highlight\r\n\r\n");
        let frame = framer.try_extract().unwrap().unwrap();
        assert_eq!(frame.body.as_deref(), Some(&b"print(1)\n$"[..]));

        // the remainder no longer starts with "$rq"
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::MalformedHeader { found }) if found == "rq"
        ));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_malformed_block_is_discarded() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"foo: bar\r\n\r\n$rq: /highlight\r\n$length: 1\r\n\r\nx");

        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::MalformedHeader { found }) if found == "foo"
        ));

        // the next frame is intact and the bad bytes are gone
        let frame = framer.try_extract().unwrap().unwrap();
        assert_eq!(frame.route(), Some("/highlight"));
        assert_eq!(frame.body.as_deref(), Some(&b"x"[..]));
        assert!(framer.try_extract().unwrap().is_none());
    }

    #[test]
    fn test_empty_header_block_is_malformed() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"\r\n\r\n");
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::MalformedHeader { found }) if found.is_empty()
        ));
    }

    #[test]
    fn test_invalid_length_means_no_body() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq: /highlight\r\n$length: ten\r\n\r\nbody");

        let frame = framer.try_extract().unwrap().unwrap();
        assert_eq!(
            frame.headers.declared_length(),
            DeclaredLength::Invalid("ten".to_string())
        );
        assert!(frame.body.is_none());
        assert_eq!(framer.buffered(), 4);
    }

    #[test]
    fn test_max_frame_size() {
        let mut framer = HeaderBlockFramer::new().with_max_frame_size(16);
        framer.extend(b"$rq: /highlight\r\n$length: 100\r\n\r\n");
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::FrameTooLarge { size: 100, max: 16 })
        ));

        let mut framer = HeaderBlockFramer::new().with_max_frame_size(16);
        framer.extend(b"$rq: /a-very-long-route-without-end");
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_response_frame() {
        let frame = HeaderFrame::new("/highlight/rsp")
            .with_header("rid", "42")
            .with_body("<pre></pre>");

        let encoded = frame.encode().unwrap();
        assert_eq!(
            encoded.as_ref(),
            &b"$rq: /highlight/rsp\r\nrid: 42\r\n$length: 11\r\n\r\n<pre></pre>"[..]
        );
    }

    #[test]
    fn test_encode_replaces_stale_length() {
        let frame = HeaderFrame::new("/x")
            .with_header(LENGTH_HEADER, "999")
            .with_body("ab");
        assert_eq!(frame.encode().unwrap().as_ref(), &b"$rq: /x\r\n$length: 2\r\n\r\nab"[..]);

        let no_body = HeaderFrame::new("/x").with_header(LENGTH_HEADER, "999");
        assert_eq!(no_body.encode().unwrap().as_ref(), &b"$rq: /x\r\n\r\n"[..]);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = HeaderFrame::new("/highlight")
            .with_header("lang", "lua")
            .with_header("rid", "abc")
            .with_body(Bytes::from_static(b"\r\n\r\nraw\x00bytes"));

        let mut framer = HeaderBlockFramer::new();
        framer.extend(&frame.encode().unwrap());
        let decoded = framer.try_extract().unwrap().unwrap();

        assert_eq!(decoded.route(), Some("/highlight"));
        assert_eq!(decoded.headers.get("lang"), Some("lua"));
        assert_eq!(decoded.headers.get("rid"), Some("abc"));
        assert_eq!(decoded.body, frame.body);
    }

    #[test]
    fn test_encode_rejects_headers_that_would_not_decode() {
        let frame = HeaderFrame::new("/x").with_header("rid", "1\r\n\r\nevil");
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::InvalidHeader { name }) if name == "rid"
        ));

        let frame = HeaderFrame::new("/x").with_header("a:b", "1");
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::InvalidHeader { name }) if name == "a:b"
        ));

        let frame = HeaderFrame::new("/x\n");
        assert!(frame.encode().is_err());

        // colons in values survive decoding
        let frame = HeaderFrame::new("/x").with_header("rid", "a:b");
        let mut framer = HeaderBlockFramer::new();
        framer.extend(&frame.encode().unwrap());
        assert_eq!(framer.try_extract().unwrap().unwrap().headers.get("rid"), Some("a:b"));
    }

    #[test]
    fn test_huge_declared_length_does_not_overflow() {
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq: /highlight\r\n$length: 18446744073709551615\r\n\r\nx");
        assert!(matches!(
            framer.try_extract(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));

        // a length that fits only waits for more data
        let mut framer = HeaderBlockFramer::new();
        framer.extend(b"$rq: /highlight\r\n$length: 4294967296\r\n\r\nx");
        assert!(framer.try_extract().unwrap().is_none());
    }
}
