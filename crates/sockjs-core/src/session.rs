//! Session state machine and outbound queue.
//!
//! Every mutating operation runs under one mutex per session, so the
//! single-attachment invariant and FIFO delivery hold no matter how many
//! transport requests race on the same id.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{AttachError, SendError, SessionError};
use crate::frame::{CloseFrame, Frame};
use crate::ids::{SenderId, SessionId};
use crate::metric_names::SENDER_ERRORS_TOTAL;
use crate::sender::{Delivery, Sender};

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, open frame not yet delivered.
    Connecting,
    /// Open frame delivered.
    Open,
    /// Close requested; close frame waiting for a sender.
    Closing,
    /// Terminal.
    Closed,
}

/// Events delivered to the application, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The open frame reached the client.
    Opened,
    /// A message sent by the client.
    Message(String),
    /// The session closed. Always the last event.
    Closed(CloseFrame),
}

struct SessionInner {
    state: SessionState,
    queue: VecDeque<String>,
    sender: Option<Arc<Sender>>,
    last_activity: Instant,
    close_frame: Option<CloseFrame>,
}

/// Transport-independent conversation state for one session id.
pub struct Session {
    id: SessionId,
    inner: Mutex<SessionInner>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    /// Create a session in `Connecting` that reports to `events`.
    pub fn new(id: SessionId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                queue: VecDeque::new(),
                sender: None,
                last_activity: Instant::now(),
                close_frame: None,
            }),
            events,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Whether the session accepts client messages.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Close code and reason, once set.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.inner.lock().close_frame.clone()
    }

    /// Messages waiting for a sender.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether a sender currently holds the attachment slot.
    pub fn has_sender(&self) -> bool {
        self.inner.lock().sender.is_some()
    }

    /// Last attach, send or heartbeat.
    pub fn last_activity(&self) -> Instant {
        self.inner.lock().last_activity
    }

    /// Write the open frame through `sender` and move `Connecting → Open`.
    ///
    /// Exactly one caller gets `Some`: the session becomes `Open` only once
    /// the frame is in the sender's conduit. `None` means the session was no
    /// longer connecting. A failed write leaves it in `Connecting`, so the
    /// client's next request can open it.
    pub fn open(&self, sender: &Sender) -> Result<Option<Delivery>, SendError> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Connecting {
            return Ok(None);
        }
        let delivery = sender.send_frame(&Frame::Open)?;
        inner.state = SessionState::Open;
        inner.last_activity = Instant::now();
        drop(inner);
        debug!(session_id = %self.id, sender = %sender.id(), "session opened");
        self.emit(SessionEvent::Opened);
        Ok(Some(delivery))
    }

    /// Claim the attachment slot for `sender` and deliver whatever is due.
    ///
    /// A `Closing` session hands its close frame to the sender and becomes
    /// `Closed`. A single-shot sender always completes inside this call.
    /// Fails without touching the queue or the current sender when the slot
    /// is taken.
    pub fn attach(&self, sender: Arc<Sender>) -> Result<(), AttachError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Closed => return Err(AttachError::Closed),
            SessionState::Connecting => return Err(AttachError::NotOpen),
            SessionState::Open | SessionState::Closing => {}
        }
        if inner.sender.is_some() {
            return Err(AttachError::AlreadyAttached);
        }

        inner.last_activity = Instant::now();
        debug!(session_id = %self.id, sender = %sender.id(), "sender attached");

        if inner.state == SessionState::Closing {
            self.finish_closing(&mut inner, &sender);
            return Ok(());
        }

        inner.sender = Some(Arc::clone(&sender));
        if !sender.is_continuous() || !inner.queue.is_empty() {
            self.flush(&mut inner);
        }
        Ok(())
    }

    /// Clear the attachment slot if `sender` holds it. Idempotent.
    pub fn detach(&self, sender: SenderId) -> bool {
        let mut inner = self.inner.lock();
        if inner.sender.as_ref().is_some_and(|s| s.id() == sender) {
            inner.sender = None;
            inner.last_activity = Instant::now();
            debug!(session_id = %self.id, %sender, "sender detached");
            true
        } else {
            false
        }
    }

    /// Queue one outbound message.
    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.send_all(std::iter::once(message.into()))
    }

    /// Queue several outbound messages; an attached streaming sender receives
    /// them as one array frame.
    pub fn send_all<I>(&self, messages: I) -> Result<(), SessionError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Open | SessionState::Closing => {}
            SessionState::Connecting => return Err(SessionError::NotOpen),
            SessionState::Closed => return Err(SessionError::Closed),
        }
        inner.queue.extend(messages.into_iter().map(Into::into));
        if inner.sender.is_some() && !inner.queue.is_empty() {
            self.flush(&mut inner);
        }
        Ok(())
    }

    /// Hand client messages to the application. Only an open session accepts
    /// them.
    pub fn receive<I>(&self, messages: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Open => {}
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Connecting | SessionState::Closing => {
                return Err(SessionError::NotOpen);
            }
        }
        inner.last_activity = Instant::now();
        drop(inner);
        for message in messages {
            self.emit(SessionEvent::Message(message));
        }
        Ok(())
    }

    /// Start closing. The close frame goes to the attached sender right away
    /// (after any queued messages), or to the next one that attaches.
    /// Returns `false` if the session was already closing or closed.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
            return false;
        }
        let frame = CloseFrame::new(code, reason);
        inner.close_frame = Some(frame.clone());
        inner.state = SessionState::Closing;
        debug!(session_id = %self.id, code, "session closing");

        if let Some(sender) = inner.sender.take() {
            if !inner.queue.is_empty()
                && let Err(e) = sender.send(&mut inner.queue)
            {
                warn!(session_id = %self.id, error = %e, "failed to flush before close");
            }
            self.finish_closing(&mut inner, &sender);
        }
        drop(inner);
        self.emit(SessionEvent::Closed(frame));
        true
    }

    /// Force the session to `Closed` without a sender (idle sweep, shutdown).
    /// Returns `false` if it was already closed or still has a sender.
    pub fn expire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed || inner.sender.is_some() {
            return false;
        }
        let already_closing = inner.state == SessionState::Closing;
        let frame = inner
            .close_frame
            .get_or_insert_with(CloseFrame::go_away)
            .clone();
        inner.state = SessionState::Closed;
        inner.queue.clear();
        drop(inner);
        debug!(session_id = %self.id, "session expired");
        if !already_closing {
            self.emit(SessionEvent::Closed(frame));
        }
        true
    }

    /// Emit a heartbeat on the attached streaming sender if it has been quiet
    /// for `interval`. Returns whether a heartbeat was written.
    pub fn heartbeat(&self, interval: Duration) -> bool {
        let mut inner = self.inner.lock();
        let Some(sender) = inner.sender.clone() else {
            return false;
        };
        if !sender.is_continuous() || !sender.heartbeat_due(interval) {
            return false;
        }
        inner.last_activity = Instant::now();
        match sender.send_frame(&Frame::Heartbeat) {
            Ok(Delivery::Continue) => true,
            Ok(Delivery::Complete) => {
                inner.sender = None;
                sender.release();
                true
            }
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "heartbeat failed, detaching sender");
                inner.sender = None;
                sender.release();
                false
            }
        }
    }

    /// Whether the session has had no sender and no activity for `timeout`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        let inner = self.inner.lock();
        inner.sender.is_none() && now.saturating_duration_since(inner.last_activity) >= timeout
    }

    fn flush(&self, inner: &mut SessionInner) {
        let Some(sender) = inner.sender.clone() else {
            return;
        };
        match sender.send(&mut inner.queue) {
            Ok(Delivery::Continue) => {
                inner.last_activity = Instant::now();
            }
            Ok(Delivery::Complete) => {
                inner.last_activity = Instant::now();
                inner.sender = None;
                sender.release();
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "send failed, detaching sender");
                metrics::counter!(SENDER_ERRORS_TOTAL).increment(1);
                inner.sender = None;
                sender.release();
            }
        }
    }

    fn finish_closing(&self, inner: &mut SessionInner, sender: &Sender) {
        let frame = inner.close_frame.clone().unwrap_or_else(CloseFrame::go_away);
        if let Err(e) = sender.send_frame(&Frame::Close(frame)) {
            debug!(session_id = %self.id, error = %e, "close frame not delivered");
        }
        inner.state = SessionState::Closed;
        inner.queue.clear();
        inner.sender = None;
        sender.release();
        debug!(session_id = %self.id, "session closed");
    }

    fn emit(&self, event: SessionEvent) {
        // The dispatcher is gone only after the Closed event, so a failure
        // here just means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("attached", &inner.sender.is_some())
            .finish()
    }
}
