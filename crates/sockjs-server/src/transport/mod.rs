//! Transport handlers.
//!
//! Every HTTP transport shares one lifecycle ([`serve_http`]): resolve the
//! session, build a sender over a fresh relay conduit, deliver the open frame
//! or attach, and hand the conduit's reader to axum as the response body.
//! The transports differ only in the data carried by [`TransportKind`].

pub mod polling;
pub mod send;
pub mod streaming;
pub mod websocket;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use serde::Deserialize;
use sockjs_core::metric_names::TRANSPORT_REQUESTS_TOTAL;
use sockjs_core::{
    AttachError, CloseFrame, Completion, ConduitReader, Delivery, Frame, Sender, Session, SessionId,
    Wrapping, conduit,
};
use tracing::{debug, warn};

use crate::endpoint::EndpointState;
use crate::errors::TransportError;
use crate::headers::{
    APPLICATION_JAVASCRIPT, TEXT_EVENT_STREAM, TEXT_HTML, no_cache, session_cookie,
};

/// Bytes of `h` sent before the first frame on `xhr_streaming`.
const XHR_STREAMING_PRELUDE_LEN: usize = 2048;
/// Minimum size of the `htmlfile` prelude.
const HTMLFILE_MIN_PRELUDE: usize = 1024;

/// The closed set of transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Short polling over `POST`.
    Xhr,
    /// Chunked streaming over `POST`.
    XhrStreaming,
    /// Server-sent events.
    EventSource,
    /// Forever-iframe with script chunks.
    HtmlFile,
    /// Script-tag polling.
    Jsonp,
    /// Framed WebSocket.
    WebSocket,
    /// Unframed WebSocket.
    RawWebSocket,
}

impl TransportKind {
    /// Name used in URLs, logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::Xhr => "xhr",
            Self::XhrStreaming => "xhr_streaming",
            Self::EventSource => "eventsource",
            Self::HtmlFile => "htmlfile",
            Self::Jsonp => "jsonp",
            Self::WebSocket => "websocket",
            Self::RawWebSocket => "raw_websocket",
        }
    }

    /// Whether the transport needs a `c` query parameter.
    pub fn needs_callback(self) -> bool {
        matches!(self, Self::HtmlFile | Self::Jsonp)
    }

    /// Completion policy of the transport's sender.
    pub fn completion(self, response_limit: usize) -> Completion {
        match self {
            Self::Xhr | Self::Jsonp => Completion::SingleShot,
            Self::XhrStreaming | Self::EventSource | Self::HtmlFile => Completion::Stream {
                byte_limit: Some(response_limit),
            },
            Self::WebSocket | Self::RawWebSocket => Completion::Stream { byte_limit: None },
        }
    }

    /// How frames are embedded in the response.
    pub fn wrapping(self, callback: Option<&str>) -> Wrapping {
        match self {
            Self::Xhr | Self::XhrStreaming => Wrapping::Line,
            Self::EventSource => Wrapping::EventStream,
            Self::HtmlFile => Wrapping::HtmlFile,
            Self::Jsonp => Wrapping::Jsonp {
                callback: callback.unwrap_or_default().to_owned(),
            },
            Self::WebSocket => Wrapping::Socket,
            Self::RawWebSocket => Wrapping::Raw,
        }
    }

    /// Response content type for HTTP transports.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::EventSource => TEXT_EVENT_STREAM,
            Self::HtmlFile => TEXT_HTML,
            Self::Xhr | Self::XhrStreaming | Self::Jsonp | Self::WebSocket | Self::RawWebSocket => {
                APPLICATION_JAVASCRIPT
            }
        }
    }

    /// Bytes written before the first frame. Not counted towards the cap.
    pub fn prelude(self, callback: Option<&str>) -> Bytes {
        match self {
            Self::XhrStreaming => {
                let mut prelude = "h".repeat(XHR_STREAMING_PRELUDE_LEN);
                prelude.push('\n');
                Bytes::from(prelude)
            }
            Self::EventSource => Bytes::from_static(b"\r\n"),
            Self::HtmlFile => Bytes::from(htmlfile_prelude(callback.unwrap_or_default())),
            Self::Xhr | Self::Jsonp | Self::WebSocket | Self::RawWebSocket => Bytes::new(),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Page that hands each script chunk to `parent.<callback>`, padded with
/// `\r\n` so browsers start rendering it.
fn htmlfile_prelude(callback: &str) -> String {
    let mut page = format!(
        r#"<!doctype html>
<html><head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
</head><body><h2>Don't panic!</h2>
  <script>
    document.domain = document.domain;
    var c = parent.{callback};
    c.start();
    function p(d) {{c.message(d);}};
    window.onload = function() {{c.stop();}};
  </script>"#
    );
    while page.len() < HTMLFILE_MIN_PRELUDE {
        page.push_str("\r\n");
    }
    page
}

/// `<server>/<session>` path segments.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionPath {
    /// Server id (load-balancer routing hint). Ignored beyond validation.
    pub server: String,
    /// Session id.
    pub session: String,
}

impl SessionPath {
    /// Validate both segments: non-empty and free of `.`.
    pub fn session_id(&self) -> Result<SessionId, TransportError> {
        let valid = |s: &str| !s.is_empty() && !s.contains('.');
        if valid(&self.server) && valid(&self.session) {
            Ok(SessionId::from_raw(self.session.as_str()))
        } else {
            Err(TransportError::NotFound)
        }
    }
}

/// `?c=<callback>` query string.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// Callback function name.
    pub c: Option<String>,
}

impl CallbackQuery {
    /// The validated callback name.
    pub fn callback(&self) -> Result<&str, TransportError> {
        let callback = self
            .c
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(TransportError::CallbackRequired)?;
        if callback
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
        {
            Ok(callback)
        } else {
            Err(TransportError::InvalidCallback)
        }
    }
}

/// Shared lifecycle of the HTTP transports.
pub(crate) fn serve_http(
    state: &EndpointState,
    id: &SessionId,
    kind: TransportKind,
    callback: Option<&str>,
    request: &HeaderMap,
) -> Response {
    metrics::counter!(TRANSPORT_REQUESTS_TOTAL, "transport" => kind.name()).increment(1);
    let (session, created) = state.registry.get_or_create(id);
    debug!(session_id = %id, transport = %kind, created, "transport request");

    // The prelude gets a slot of its own so it never crowds out the frames.
    let prelude = kind.prelude(callback);
    let capacity = state.options.conduit_capacity + usize::from(!prelude.is_empty());
    let (writer, reader) = conduit(capacity);
    let sender = Sender::new(
        &session,
        writer,
        kind.wrapping(callback),
        kind.completion(state.options.response_limit),
    );
    if let Err(e) = sender.write_prelude(prelude) {
        debug!(session_id = %id, error = %e, "prelude not written");
    }

    if deliver(&session, &sender, kind) && sender.is_continuous() && !sender.is_closed() {
        release_on_hangup(&sender);
    }

    stream_response(state, kind, request, reader)
}

/// Deliver the open frame or attach `sender`, answering with a close frame
/// when the session cannot take it. Returns whether `sender` is attached.
pub(crate) fn deliver(session: &Arc<Session>, sender: &Arc<Sender>, kind: TransportKind) -> bool {
    match session.open(sender) {
        Ok(None | Some(Delivery::Continue)) => {}
        Ok(Some(Delivery::Complete)) => {
            sender.release();
            return false;
        }
        Err(e) => {
            warn!(session_id = %session.id(), transport = %kind, error = %e, "open frame not delivered");
            sender.release();
            return false;
        }
    }

    match session.attach(Arc::clone(sender)) {
        Ok(()) => true,
        Err(AttachError::AlreadyAttached) => {
            warn!(session_id = %session.id(), transport = %kind, "another connection still open");
            reply_and_release(sender, CloseFrame::another_connection());
            false
        }
        Err(AttachError::Closed | AttachError::NotOpen) => {
            debug!(session_id = %session.id(), transport = %kind, "session closed, go away");
            reply_and_release(sender, CloseFrame::go_away());
            false
        }
    }
}

fn reply_and_release(sender: &Sender, close: CloseFrame) {
    if let Err(e) = sender.send_frame(&Frame::Close(close)) {
        debug!(sender = %sender.id(), error = %e, "close frame not written");
    }
    sender.release();
}

/// Detach and release `sender` once the network side drops the response.
pub(crate) fn release_on_hangup(sender: &Arc<Sender>) {
    let sender = Arc::clone(sender);
    let hangup = sender.hangup_token();
    drop(tokio::spawn(async move {
        hangup.cancelled().await;
        sender.close();
    }));
}

fn stream_response(
    state: &EndpointState,
    kind: TransportKind,
    request: &HeaderMap,
    reader: ConduitReader,
) -> Response {
    let mut response = Response::new(Body::from_stream(reader));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    let _ = headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(kind.content_type()),
    );
    no_cache(headers);
    if state.options.cookie_needed {
        let _ = headers.insert(header::SET_COOKIE, session_cookie(request));
    }
    response
}
