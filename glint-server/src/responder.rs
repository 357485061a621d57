//! Ordered per-stream response queue.
//!
//! Requests are rendered on the blocking pool and may finish in any order.
//! The queue holds one receiver per request, in arrival order, and a single
//! writer task drains them front to back, so response N is always written
//! before response N+1.

use crate::error::ServerError;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type PendingResponse = oneshot::Receiver<Option<Bytes>>;

/// Sending side of a response queue.
///
/// Dropping it lets the writer finish once every queued response is written.
#[derive(Debug)]
pub struct ResponseQueue {
    tx: mpsc::Sender<PendingResponse>,
}

/// Creates a queue writing to `writer`.
///
/// `capacity` bounds the number of queued requests; `push` waits when it is
/// reached. The returned task resolves to the number of bytes written.
pub fn response_queue<W>(writer: W, capacity: usize) -> (ResponseQueue, JoinHandle<std::io::Result<u64>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(drain(writer, rx));
    (ResponseQueue { tx }, handle)
}

impl ResponseQueue {
    /// Reserves the next slot and runs `job` on the blocking pool.
    ///
    /// `None` from the job, or a panic inside it, leaves the slot empty and
    /// nothing is written for it.
    pub async fn push<F>(&self, job: F) -> Result<(), ServerError>
    where
        F: FnOnce() -> Option<Bytes> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(done_rx)
            .await
            .map_err(|_| ServerError::WriterClosed)?;
        tokio::task::spawn_blocking(move || {
            let _ = done_tx.send(job());
        });
        Ok(())
    }
}

async fn drain<W>(mut writer: W, mut rx: mpsc::Receiver<PendingResponse>) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(pending) = rx.recv().await {
        match pending.await {
            Ok(Some(bytes)) => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                written += bytes.len() as u64;
                tracing::trace!("Wrote {} byte response", bytes.len());
            }
            Ok(None) => {}
            Err(_) => tracing::error!("Response job ended without a result"),
        }
    }
    writer.flush().await?;
    Ok(written)
}
