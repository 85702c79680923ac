//! Error types for the session core.
//!
//! None of these are fatal: transports resolve each one into a close frame,
//! an HTTP status, or a logged detach.

use thiserror::Error;

/// Failure to undo the JSON string escaping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    /// Backslash followed by a character that is not a valid escape.
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    /// `\u` not followed by four hex digits.
    #[error("truncated unicode escape")]
    TruncatedUnicode,
    /// A surrogate half without its partner.
    #[error("unpaired surrogate \\u{0:04X}")]
    UnpairedSurrogate(u32),
    /// Input ends with a lone backslash.
    #[error("dangling backslash at end of input")]
    DanglingBackslash,
}

/// Failure to parse an encoded frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The input was empty.
    #[error("empty frame")]
    Empty,
    /// The leading type byte is not one of `o`, `a`, `c`, `h`.
    #[error("unknown frame type '{0}'")]
    UnknownType(char),
    /// `o` or `h` carried trailing bytes.
    #[error("unexpected payload after '{0}' frame")]
    TrailingPayload(char),
    /// The array or close payload was not valid JSON of the expected shape.
    #[error("malformed frame payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure writing into a relay conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConduitError {
    /// The writer was closed, or the network side hung up.
    #[error("conduit closed")]
    Closed,
    /// The bounded buffer is full; the peer is not draining.
    #[error("conduit full")]
    Full,
}

/// Failure pushing frames through a sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The underlying conduit rejected the write.
    #[error("sender i/o failure: {0}")]
    Conduit(#[from] ConduitError),
    /// The sender was already closed.
    #[error("sender closed")]
    Closed,
}

/// Failure attaching a sender to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachError {
    /// Another sender currently holds the attachment slot.
    #[error("another connection still open")]
    AlreadyAttached,
    /// The session is closed.
    #[error("session closed")]
    Closed,
    /// The session has not delivered its open frame yet.
    #[error("session not open")]
    NotOpen,
}

/// Failure of a session-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is not in a state that accepts the operation.
    #[error("session not open")]
    NotOpen,
    /// The session reached its terminal state.
    #[error("session closed")]
    Closed,
}
