//! Dedicated writer task for outbound messages.
//!
//! All sends funnel through one mpsc channel drained by a single task that
//! owns the sink. Two concurrent `send()` calls can therefore never
//! interleave partial envelopes, and a handler sending from the dispatch
//! task never contends with the receive loop.
//!
//! ```text
//! send()    ─┐
//! handler   ─┼─► mpsc::UnboundedSender<Bytes> ─► writer task ─► sink
//! send_event─┘
//! ```

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::framing::ContentWriter;

/// Handle for queueing payloads to the writer task.
///
/// Cheaply cloneable; dropping every clone ends the task.
#[derive(Clone)]
pub(crate) struct OutboundHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl OutboundHandle {
    /// Queue one encoded payload for framing and writing.
    pub(crate) fn send(&self, payload: Bytes) -> Result<()> {
        self.tx.send(payload).map_err(|_| Error::SessionClosed)
    }
}

/// Spawn the writer task over the given sink.
///
/// A write failure cancels `closed`, which the receive loop treats as
/// session shutdown.
pub(crate) fn spawn_writer_task<W>(
    sink: W,
    closed: CancellationToken,
) -> (OutboundHandle, JoinHandle<()>)
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(writer_loop(rx, sink, closed));
    (OutboundHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::UnboundedReceiver<Bytes>, sink: W, closed: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = ContentWriter::new(sink);
    while let Some(payload) = rx.recv().await {
        if let Err(e) = writer.write(&payload).await {
            tracing::error!("write failed, closing session: {e}");
            closed.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}
