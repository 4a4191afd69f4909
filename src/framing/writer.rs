//! Framed payload writer over any `AsyncWrite`.

use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Build one complete frame as a single byte vector.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = header_for(payload);
    let mut buf = Vec::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Header bytes for a payload of the given length.
pub(crate) fn header_for(payload: &[u8]) -> String {
    format!("Content-Length: {}\r\n\r\n", payload.len())
}

/// Writes framed payloads to an underlying byte sink.
pub struct ContentWriter<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin> ContentWriter<W> {
    /// Create a writer over the given sink.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Frame and write one payload, flushing afterwards.
    ///
    /// Uses a vectored write for the header + payload pair to avoid copying
    /// them into one buffer, with a partial-write loop for sinks that accept
    /// fewer bytes than offered.
    pub async fn write(&mut self, payload: &[u8]) -> Result<()> {
        let header = header_for(payload);
        let header = header.as_bytes();
        let total = header.len() + payload.len();

        let mut written = 0;
        while written < total {
            let slices = remaining_slices(header, payload, written);
            let n = self.sink.write_vectored(&slices).await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write_vectored returned 0",
                )));
            }
            written += n;
        }

        self.sink.flush().await?;
        Ok(())
    }

    /// Shut down the underlying sink.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sink.shutdown().await?;
        Ok(())
    }
}

/// IoSlice pair for the bytes still to be written after a partial write.
fn remaining_slices<'a>(header: &'a [u8], payload: &'a [u8], skip: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(2);
    if skip < header.len() {
        slices.push(IoSlice::new(&header[skip..]));
        if !payload.is_empty() {
            slices.push(IoSlice::new(payload));
        }
    } else {
        let offset = skip - header.len();
        if offset < payload.len() {
            slices.push(IoSlice::new(&payload[offset..]));
        }
    }
    slices
}
