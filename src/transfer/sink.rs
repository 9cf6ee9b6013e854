use async_trait::async_trait;
use axum::body::Bytes;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

use crate::error::{ArchiveError, Result};

/// The client side of a transfer.
#[async_trait]
pub trait ChunkSink: Send {
    /// Delivers one chunk, waiting while the client is not keeping up.
    ///
    /// Fails with `Cancelled` once the client is gone.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Ends the body cleanly once every written chunk has been handed over.
    async fn finish(&mut self) -> Result<()>;

    /// Ends the body so that the client sees an incomplete response.
    async fn abort(&mut self, reason: &str);

    /// Resolves once the client has gone away.
    async fn closed(&self);
}

/// Sink feeding an HTTP response body through a channel of capacity one.
///
/// At most one chunk sits between the transfer and the HTTP layer, so a slow
/// client holds the transfer back.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Bytes>>,
    aborted: Arc<AtomicBool>,
}

/// Response body paired with a [`ChannelSink`].
///
/// Yields an error after the last chunk when the transfer was aborted, which
/// makes the server drop the connection instead of terminating the body.
pub struct TransferBody {
    rx: mpsc::Receiver<Bytes>,
    aborted: Arc<AtomicBool>,
    done: bool,
}

pub fn body_channel() -> (ChannelSink, TransferBody) {
    let (tx, rx) = mpsc::channel(1);
    let aborted = Arc::new(AtomicBool::new(false));
    (
        ChannelSink {
            tx: Some(tx),
            aborted: Arc::clone(&aborted),
        },
        TransferBody {
            rx,
            aborted,
            done: false,
        },
    )
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ArchiveError::Unknown(std::io::Error::other(
                "write after the response body was closed",
            )));
        };
        tx.send(chunk).await.map_err(|_| ArchiveError::Cancelled)
    }

    async fn finish(&mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Err(ArchiveError::Unknown(std::io::Error::other(
                "response body already closed",
            )));
        };
        // With capacity one, a free slot means the last chunk was taken.
        tx.reserve().await.map_err(|_| ArchiveError::Cancelled)?;
        Ok(())
    }

    async fn abort(&mut self, reason: &str) {
        debug!("Aborting response body: {}", reason);
        self.aborted.store(true, Ordering::SeqCst);
        self.tx = None;
    }

    async fn closed(&self) {
        if let Some(tx) = self.tx.as_ref() {
            tx.closed().await;
        }
    }
}

impl Stream for TransferBody {
    type Item = std::result::Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {
                self.done = true;
                if self.aborted.load(Ordering::SeqCst) {
                    Poll::Ready(Some(Err(std::io::Error::other("archive transfer aborted"))))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
