//! Framed payload reader over any `AsyncRead`.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::scanner::{ContentScanner, DEFAULT_MAX_PAYLOAD_SIZE};

/// Default number of bytes pulled from the source per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;

/// Reads framed payloads from an underlying byte source.
///
/// Pulls bounded chunks from the source and feeds them to a
/// [`ContentScanner`] until one full envelope is available.
pub struct ContentReader<R> {
    source: R,
    scanner: ContentScanner,
    chunk: Vec<u8>,
    open: bool,
}

impl<R: AsyncRead + Unpin> ContentReader<R> {
    /// Create a reader with default chunk size and payload limit.
    pub fn new(source: R) -> Self {
        Self::with_config(source, DEFAULT_READ_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a reader with a custom per-read chunk size and payload limit.
    pub fn with_config(source: R, chunk_size: usize, max_payload_size: usize) -> Self {
        Self {
            source,
            scanner: ContentScanner::with_max_payload(max_payload_size),
            chunk: vec![0u8; chunk_size.max(1)],
            open: true,
        }
    }

    /// True until the source reaches end-of-stream or becomes untrusted.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Read the next payload.
    ///
    /// Blocks until one full envelope is available. `None` always means the
    /// stream is closed, never an empty message.
    pub async fn read(&mut self) -> Option<Bytes> {
        while self.open {
            match self.scanner.try_extract() {
                Ok(Some(payload)) => return Some(payload),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("closing reader: {e}");
                    self.open = false;
                    return None;
                }
            }

            match self.source.read(&mut self.chunk).await {
                Ok(0) => self.open = false,
                Ok(n) => self.scanner.push(&self.chunk[..n]),
                Err(e) => {
                    tracing::debug!("transport read failed: {e}");
                    self.open = false;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_single_payload() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tx.write_all(b"Content-Length: 5\r\n\r\nhello")
            .await
            .unwrap();

        let mut reader = ContentReader::new(rx);
        let payload = reader.read().await.unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(reader.is_open());
    }

    #[tokio::test]
    async fn test_read_reassembles_split_writes() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut reader = ContentReader::with_config(rx, 4, DEFAULT_MAX_PAYLOAD_SIZE);

        let writer = tokio::spawn(async move {
            for piece in ["Content-Len", "gth: 5\r", "\n\r\nhe", "llo"] {
                tx.write_all(piece.as_bytes()).await.unwrap();
                tx.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            tx
        });

        let payload = reader.read().await.unwrap();
        assert_eq!(&payload[..], b"hello");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let (tx, rx) = tokio::io::duplex(1024);
        drop(tx);

        let mut reader = ContentReader::new(rx);
        assert!(reader.read().await.is_none());
        assert!(!reader.is_open());
    }

    #[tokio::test]
    async fn test_eof_after_partial_envelope_returns_none() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tx.write_all(b"Content-Length: 10\r\n\r\nhalf").await.unwrap();
        drop(tx);

        let mut reader = ContentReader::new(rx);
        assert!(reader.read().await.is_none());
    }

    #[tokio::test]
    async fn test_two_payloads_buffered_together() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tx.write_all(b"Content-Length: 3\r\n\r\noneContent-Length: 3\r\n\r\ntwo")
            .await
            .unwrap();

        let mut reader = ContentReader::new(rx);
        assert_eq!(&reader.read().await.unwrap()[..], b"one");
        assert_eq!(&reader.read().await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_oversized_payload_closes_reader() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        tx.write_all(b"Content-Length: 64\r\n\r\n").await.unwrap();

        let mut reader = ContentReader::with_config(rx, 16, 32);
        assert!(reader.read().await.is_none());
        assert!(!reader.is_open());
    }
}
