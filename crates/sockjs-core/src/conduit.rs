//! Relay conduit: a bounded chunk channel with one synchronous writer and one
//! asynchronously drained reader.
//!
//! Senders write frames while holding a session lock, so a write must never
//! wait for network readiness. The reader is handed to the HTTP layer as a
//! response body (or to a WebSocket pump) and drains at the peer's pace.
//! Dropping the reader (peer went away) trips the writer's hang-up signal.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::errors::ConduitError;

/// Create a conduit holding at most `capacity` undrained chunks.
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let hangup = CancellationToken::new();
    let writer = ConduitWriter {
        tx: Mutex::new(Some(tx)),
        hangup: hangup.clone(),
    };
    let reader = ConduitReader {
        inner: ReceiverStream::new(rx),
        hangup,
    };
    (writer, reader)
}

/// Producer end. Writes never block.
pub struct ConduitWriter {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    hangup: CancellationToken,
}

impl ConduitWriter {
    /// Enqueue a chunk. Fails if the writer was closed, the reader is gone,
    /// or the buffer is full.
    pub fn write(&self, chunk: Bytes) -> Result<(), ConduitError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(ConduitError::Closed)?;
        match tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConduitError::Full),
            Err(TrySendError::Closed(_)) => Err(ConduitError::Closed),
        }
    }

    /// Enqueue several chunks in order, stopping at the first failure.
    pub fn write_all(&self, chunks: impl IntoIterator<Item = Bytes>) -> Result<usize, ConduitError> {
        let mut written = 0;
        for chunk in chunks {
            let len = chunk.len();
            self.write(chunk)?;
            written += len;
        }
        Ok(written)
    }

    /// Close the producer side. Buffered chunks are still delivered, then the
    /// reader ends. Idempotent.
    pub fn close(&self) {
        drop(self.tx.lock().take());
    }

    /// Whether writes will fail.
    pub fn is_closed(&self) -> bool {
        self.hangup.is_cancelled()
            || self
                .tx
                .lock()
                .as_ref()
                .is_none_or(|tx| tx.is_closed())
    }

    /// Resolves once the reader has been dropped.
    pub fn hung_up(&self) -> WaitForCancellationFuture<'_> {
        self.hangup.cancelled()
    }

    /// Owned hang-up signal, for watchers that outlive a borrow.
    pub fn hangup_token(&self) -> CancellationToken {
        self.hangup.clone()
    }
}

/// Consumer end; a `Stream` of chunks suitable for `axum::body::Body::from_stream`.
pub struct ConduitReader {
    inner: ReceiverStream<Bytes>,
    hangup: CancellationToken,
}

impl Stream for ConduitReader {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|item| item.map(Ok))
    }
}

impl Drop for ConduitReader {
    fn drop(&mut self) {
        self.hangup.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn chunks_arrive_in_order() {
        let (writer, mut reader) = conduit(8);
        writer.write(Bytes::from("a")).unwrap();
        writer.write(Bytes::from("b")).unwrap();
        writer.close();

        let mut out = Vec::new();
        while let Some(Ok(chunk)) = reader.next().await {
            out.push(chunk);
        }
        assert_eq!(out, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn write_after_close_fails() {
        let (writer, _reader) = conduit(8);
        writer.close();
        assert_eq!(writer.write(Bytes::from("x")), Err(ConduitError::Closed));
        assert!(writer.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let (writer, _reader) = conduit(8);
        writer.close();
        writer.close();
        assert!(writer.is_closed());
    }

    #[test]
    fn full_buffer_rejects_without_blocking() {
        let (writer, _reader) = conduit(1);
        writer.write(Bytes::from("1")).unwrap();
        assert_eq!(writer.write(Bytes::from("2")), Err(ConduitError::Full));
    }

    #[tokio::test]
    async fn dropping_reader_signals_hangup() {
        let (writer, reader) = conduit(8);
        assert!(!writer.is_closed());
        drop(reader);
        writer.hung_up().await;
        assert!(writer.is_closed());
        assert_eq!(writer.write(Bytes::from("x")), Err(ConduitError::Closed));
    }

    #[test]
    fn write_all_counts_bytes() {
        let (writer, _reader) = conduit(8);
        let n = writer
            .write_all([Bytes::from("ab"), Bytes::from("cde")])
            .unwrap();
        assert_eq!(n, 5);
    }

    #[tokio::test]
    async fn buffered_chunks_survive_close() {
        let (writer, mut reader) = conduit(4);
        writer.write(Bytes::from("tail")).unwrap();
        writer.close();
        assert_eq!(reader.next().await.unwrap().unwrap(), Bytes::from("tail"));
        assert!(reader.next().await.is_none());
    }
}
