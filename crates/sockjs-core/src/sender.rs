//! Transport-bound output channel.
//!
//! A [`Sender`] owns the writer end of a relay conduit and knows how its
//! transport wraps frames. It is attached to at most one session at a time
//! and is never shared between transports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conduit::ConduitWriter;
use crate::errors::SendError;
use crate::frame::{Frame, Wrapping, encode_array};
use crate::ids::SenderId;
use crate::session::Session;

/// When a sender is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Polling transports: one delivery, then finish.
    SingleShot,
    /// Streaming transports: keep delivering until the byte cap (if any) is
    /// reached between two frames.
    Stream {
        /// Maximum framed bytes before the response is finished.
        byte_limit: Option<usize>,
    },
}

/// Outcome of a successful delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The sender can take more frames.
    Continue,
    /// The sender reached its completion condition and must be released.
    Complete,
}

/// Output channel for one transport request.
pub struct Sender {
    id: SenderId,
    session: Weak<Session>,
    writer: ConduitWriter,
    wrapping: Wrapping,
    completion: Completion,
    written: AtomicUsize,
    last_write: Mutex<Instant>,
    closed: AtomicBool,
}

impl Sender {
    /// Create a sender bound to `session` that writes through `writer`.
    pub fn new(
        session: &Arc<Session>,
        writer: ConduitWriter,
        wrapping: Wrapping,
        completion: Completion,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SenderId::next(),
            session: Arc::downgrade(session),
            writer,
            wrapping,
            completion,
            written: AtomicUsize::new(0),
            last_write: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        })
    }

    /// Identity used by the session's attachment slot.
    pub fn id(&self) -> SenderId {
        self.id
    }

    /// Completion policy.
    pub fn completion(&self) -> Completion {
        self.completion
    }

    /// Whether this sender stays attached across deliveries.
    pub fn is_continuous(&self) -> bool {
        matches!(self.completion, Completion::Stream { .. })
    }

    /// Framed bytes written so far (preludes excluded).
    pub fn bytes_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Whether the sender was released or its peer hung up.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.writer.is_closed()
    }

    /// Drain the whole queue into one array frame, or write `a[]` if it is
    /// empty. On failure the drained messages are put back at the front of
    /// the queue in their original order. The raw wrapping writes one chunk
    /// per message and puts back only those that did not make it.
    pub fn send(&self, queue: &mut VecDeque<String>) -> Result<Delivery, SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        if matches!(self.wrapping, Wrapping::Raw) {
            return self.send_raw(queue);
        }
        let drained: Vec<String> = queue.drain(..).collect();
        let chunk = self.wrapping.wrap_encoded(&encode_array(&drained));
        match self.writer.write_all([chunk]) {
            Ok(n) => Ok(self.record(n)),
            Err(e) => {
                for message in drained.into_iter().rev() {
                    queue.push_front(message);
                }
                Err(e.into())
            }
        }
    }

    fn send_raw(&self, queue: &mut VecDeque<String>) -> Result<Delivery, SendError> {
        let mut written = 0;
        while let Some(message) = queue.front() {
            if let Err(e) = self.writer.write(Bytes::copy_from_slice(message.as_bytes())) {
                if written > 0 {
                    let _ = self.record(written);
                }
                return Err(e.into());
            }
            written += message.len();
            let _ = queue.pop_front();
        }
        Ok(self.record(written))
    }

    /// Write a single control frame (open, close, heartbeat).
    pub fn send_frame(&self, frame: &Frame) -> Result<Delivery, SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        let n = self.writer.write_all(self.wrapping.wrap(frame))?;
        Ok(self.record(n))
    }

    /// Write transport preamble bytes that do not count towards the cap.
    pub fn write_prelude(&self, prelude: Bytes) -> Result<(), SendError> {
        if prelude.is_empty() {
            return Ok(());
        }
        self.writer.write(prelude)?;
        Ok(())
    }

    /// Whether nothing has been written for at least `interval`.
    pub fn heartbeat_due(&self, interval: Duration) -> bool {
        self.last_write.lock().elapsed() >= interval
    }

    /// Release the conduit without touching the session. Used by the session
    /// itself while it holds its own lock. Idempotent.
    pub fn release(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.writer.close();
            debug!(sender = %self.id, bytes = self.bytes_written(), "sender released");
        }
    }

    /// Detach from the session (if still attached) and release the conduit.
    /// Idempotent and safe on a conduit the peer already closed.
    pub fn close(&self) {
        if let Some(session) = self.session.upgrade() {
            let _ = session.detach(self.id);
        }
        self.release();
    }

    /// Signal that resolves when the network side drops the response.
    pub fn hangup_token(&self) -> CancellationToken {
        self.writer.hangup_token()
    }

    fn record(&self, n: usize) -> Delivery {
        let total = self.written.fetch_add(n, Ordering::Relaxed) + n;
        *self.last_write.lock() = Instant::now();
        match self.completion {
            Completion::SingleShot => Delivery::Complete,
            Completion::Stream {
                byte_limit: Some(limit),
            } if total >= limit => Delivery::Complete,
            Completion::Stream { .. } => Delivery::Continue,
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("id", &self.id)
            .field("wrapping", &self.wrapping)
            .field("completion", &self.completion)
            .field("written", &self.bytes_written())
            .finish_non_exhaustive()
    }
}
