//! Protocol frames and their transport wrapping.
//!
//! | frame | encoding |
//! |---|---|
//! | open | `o` |
//! | array | `a["m1","m2"]` |
//! | close | `c[3000,"Go away!"]` |
//! | heartbeat | `h` |

use std::fmt;

use bytes::Bytes;

use crate::errors::FrameError;
use crate::escape::{escape_json_into, quote_json};

/// Reserved close codes.
pub mod close_code {
    /// Protocol error (e.g. broken JSON on a WebSocket).
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// A second transport tried to attach while one is still attached.
    pub const ANOTHER_CONNECTION: u16 = 2010;
    /// Session closed by the server.
    pub const GO_AWAY: u16 = 3000;
}

/// Code and reason carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseFrame {
    /// Build a close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// `c[3000,"Go away!"]`.
    pub fn go_away() -> Self {
        Self::new(close_code::GO_AWAY, "Go away!")
    }

    /// `c[2010,"Another connection still open"]`.
    pub fn another_connection() -> Self {
        Self::new(close_code::ANOTHER_CONNECTION, "Another connection still open")
    }

    /// `c[1002,"<reason>"]`.
    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self::new(close_code::PROTOCOL_ERROR, reason)
    }
}

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Session opened.
    Open,
    /// Batch of application messages.
    Array(Vec<String>),
    /// Session closed.
    Close(CloseFrame),
    /// Keep-alive.
    Heartbeat,
}

impl Frame {
    /// Encode the frame without any transport wrapping.
    pub fn encode(&self) -> String {
        match self {
            Self::Open => "o".to_owned(),
            Self::Heartbeat => "h".to_owned(),
            Self::Array(messages) => encode_array(messages),
            Self::Close(close) => {
                let mut out = format!("c[{},\"", close.code);
                escape_json_into(&mut out, &close.reason);
                out.push_str("\"]");
                out
            }
        }
    }

    /// Parse an unwrapped frame.
    pub fn decode(input: &str) -> Result<Self, FrameError> {
        let mut chars = input.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let payload = chars.as_str();
        match kind {
            'o' | 'h' if !payload.is_empty() => Err(FrameError::TrailingPayload(kind)),
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => Ok(Self::Array(serde_json::from_str(payload)?)),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload)?;
                Ok(Self::Close(CloseFrame::new(code, reason)))
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Encode an array frame directly from borrowed messages, preserving order.
pub fn encode_array<I, S>(messages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::from("a[");
    for (i, message) in messages.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        escape_json_into(&mut out, message.as_ref());
        out.push('"');
    }
    out.push(']');
    out
}

/// How an encoded frame is embedded in a transport's response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wrapping {
    /// `<frame>\n` (xhr, xhr_streaming).
    Line,
    /// `data: <frame>\r\n\r\n` (eventsource).
    EventStream,
    /// `<script>\np("<frame>");\n</script>\r\n` (htmlfile).
    HtmlFile,
    /// `/**/<callback>("<frame>");\r\n` (jsonp).
    Jsonp {
        /// Validated callback name.
        callback: String,
    },
    /// `<frame>` as one WebSocket text message.
    Socket,
    /// Raw WebSocket: each application message is its own text message and
    /// control frames produce no output.
    Raw,
}

impl Wrapping {
    /// Wrap an encoded frame for the wire. Returns no chunks for frames the
    /// wrapping does not carry.
    pub fn wrap(&self, frame: &Frame) -> Vec<Bytes> {
        match self {
            Self::Raw => match frame {
                Frame::Array(messages) => messages
                    .iter()
                    .map(|m| Bytes::copy_from_slice(m.as_bytes()))
                    .collect(),
                Frame::Open | Frame::Close(_) | Frame::Heartbeat => Vec::new(),
            },
            _ => vec![self.wrap_encoded(&frame.encode())],
        }
    }

    /// Wrap an already-encoded frame. Not meaningful for [`Wrapping::Raw`],
    /// which passes the text through.
    pub fn wrap_encoded(&self, encoded: &str) -> Bytes {
        let wrapped = match self {
            Self::Line => format!("{encoded}\n"),
            Self::EventStream => format!("data: {encoded}\r\n\r\n"),
            Self::HtmlFile => format!("<script>\np({});\n</script>\r\n", quote_json(encoded)),
            Self::Jsonp { callback } => format!("/**/{callback}({});\r\n", quote_json(encoded)),
            Self::Socket | Self::Raw => encoded.to_owned(),
        };
        Bytes::from(wrapped)
    }
}
