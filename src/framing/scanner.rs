//! Incremental scanner extracting framed payloads from a byte buffer.
//!
//! Headers may arrive split across arbitrarily many source reads, so the
//! scanner is a restartable single-pass parser over a `bytes::BytesMut`
//! accumulation buffer. Bytes that cannot begin a valid header are discarded
//! one at a time; a partial match at the end of the buffer is kept until more
//! data arrives.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Literal header the scanner seeks. Case-sensitive.
const HEADER_PREFIX: &[u8] = b"Content-Length:";

/// Exact byte sequence required between the length and the payload.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default maximum accepted payload length: 1GB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024;

/// Outcome of one parse attempt at the front of the buffer.
enum Parse {
    /// A complete header was parsed; the payload may still be in flight.
    Frame {
        header_len: usize,
        payload_len: usize,
    },
    /// The buffer is a prefix of a valid header; wait for more data.
    NeedMore,
    /// The buffer cannot begin a valid header; discard one byte and rescan.
    Mismatch,
}

/// Buffer for accumulating incoming bytes and extracting framed payloads.
pub struct ContentScanner {
    /// Accumulated bytes from source reads.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: usize,
}

impl ContentScanner {
    /// Create a new scanner with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new scanner with a custom payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_payload_size,
        }
    }

    /// Append raw bytes from the source.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete payload.
    ///
    /// Returns:
    /// - `Ok(Some(payload))` when a full envelope was buffered
    /// - `Ok(None)` when more data is needed
    /// - `Err(...)` when a well-formed header declares a payload larger than
    ///   the configured maximum (the stream can no longer be trusted)
    ///
    /// Leading bytes that do not form a valid header are discarded, including
    /// headers declaring a zero-length payload: empty messages are not
    /// meaningful on this wire, so such a header is noise like any other.
    pub fn try_extract(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.parse_at_start()? {
                Parse::Frame {
                    header_len,
                    payload_len,
                } => {
                    if self.buffer.len() < header_len + payload_len {
                        return Ok(None);
                    }
                    self.buffer.advance(header_len);
                    return Ok(Some(self.buffer.split_to(payload_len).freeze()));
                }
                Parse::NeedMore => return Ok(None),
                Parse::Mismatch => {
                    self.buffer.advance(1);
                }
            }
        }
    }

    /// Attempt to parse a complete header at the front of the buffer.
    fn parse_at_start(&self) -> Result<Parse> {
        let buf = &self.buffer[..];

        let have = HEADER_PREFIX.len().min(buf.len());
        if buf[..have] != HEADER_PREFIX[..have] {
            return Ok(Parse::Mismatch);
        }
        if buf.len() < HEADER_PREFIX.len() {
            return Ok(Parse::NeedMore);
        }

        let mut i = HEADER_PREFIX.len();
        while i < buf.len() && (buf[i] == b' ' || buf[i] == b'\t') {
            i += 1;
        }

        let digits_start = i;
        let mut len: usize = 0;
        while i < buf.len() && buf[i].is_ascii_digit() {
            len = match len
                .checked_mul(10)
                .and_then(|l| l.checked_add((buf[i] - b'0') as usize))
            {
                Some(l) => l,
                None => return Ok(Parse::Mismatch),
            };
            i += 1;
        }
        if i == buf.len() {
            return Ok(Parse::NeedMore);
        }
        if i == digits_start {
            return Ok(Parse::Mismatch);
        }

        let have = HEADER_TERMINATOR.len().min(buf.len() - i);
        if buf[i..i + have] != HEADER_TERMINATOR[..have] {
            return Ok(Parse::Mismatch);
        }
        if buf.len() - i < HEADER_TERMINATOR.len() {
            return Ok(Parse::NeedMore);
        }
        i += HEADER_TERMINATOR.len();

        if len == 0 {
            return Ok(Parse::Mismatch);
        }
        if len > self.max_payload_size {
            return Err(Error::Protocol(format!(
                "payload length {len} exceeds maximum {}",
                self.max_payload_size
            )));
        }

        Ok(Parse::Frame {
            header_len: i,
            payload_len: len,
        })
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload).into_bytes()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut scanner = ContentScanner::new();
        scanner.push(b"Content-Length: 5\r\n\r\nhello");

        let payload = scanner.try_extract().unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(scanner.is_empty());
        assert!(scanner.try_extract().unwrap().is_none());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut scanner = ContentScanner::new();
        let mut data = frame("first");
        data.extend(frame("second"));
        data.extend(frame("third"));
        scanner.push(&data);

        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"first");
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"second");
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"third");
        assert!(scanner.try_extract().unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut scanner = ContentScanner::new();
        let data = frame("hello");
        let mut extracted = Vec::new();

        for byte in &data {
            scanner.push(&[*byte]);
            if let Some(payload) = scanner.try_extract().unwrap() {
                extracted.push(payload);
            }
        }

        assert_eq!(extracted.len(), 1);
        assert_eq!(&extracted[0][..], b"hello");
    }

    #[test]
    fn test_garbage_before_header_is_skipped() {
        let mut scanner = ContentScanner::new();
        scanner.push(b"\r\nnoise bytes Content-Len");
        scanner.push(b"gth: 2\r\n\r\nok");

        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"ok");
    }

    #[test]
    fn test_tabs_and_spaces_after_colon() {
        let mut scanner = ContentScanner::new();
        scanner.push(b"Content-Length: \t 2\r\n\r\nhi");
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"hi");
    }

    #[test]
    fn test_missing_terminator_is_noise() {
        let mut scanner = ContentScanner::new();
        scanner.push(b"Content-Length: 5\n\nhello");
        assert!(scanner.try_extract().unwrap().is_none());

        // A well-formed frame after the junk still parses.
        scanner.push(&frame("later"));
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"later");
    }

    #[test]
    fn test_zero_length_header_is_noise() {
        let mut scanner = ContentScanner::new();
        let mut data = b"Content-Length: 0\r\n\r\n".to_vec();
        data.extend(frame("real"));
        scanner.push(&data);

        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"real");
    }

    #[test]
    fn test_missing_length_digits_is_noise() {
        let mut scanner = ContentScanner::new();
        let mut data = b"Content-Length: \r\n\r\n".to_vec();
        data.extend(frame("real"));
        scanner.push(&data);

        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"real");
    }

    #[test]
    fn test_payload_split_across_pushes() {
        let mut scanner = ContentScanner::new();
        scanner.push(b"Content-Length: 10\r\n\r\n01234");
        assert!(scanner.try_extract().unwrap().is_none());

        scanner.push(b"56789");
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"0123456789");
    }

    #[test]
    fn test_oversized_payload_is_fatal() {
        let mut scanner = ContentScanner::with_max_payload(16);
        scanner.push(b"Content-Length: 17\r\n\r\n");

        let err = scanner.try_extract().unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_case_sensitive_header() {
        let mut scanner = ContentScanner::new();
        let mut data = b"content-length: 2\r\n\r\nxx".to_vec();
        data.extend(frame("ok"));
        scanner.push(&data);

        // The lowercase header is not recognized; its "payload" is skipped as
        // noise while scanning for the next real header.
        assert_eq!(&scanner.try_extract().unwrap().unwrap()[..], b"ok");
    }
}
