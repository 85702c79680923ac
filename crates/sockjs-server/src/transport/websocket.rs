//! WebSocket transports.
//!
//! The framed transport carries protocol frames as text messages and accepts
//! JSON-encoded messages from the client. The raw transport skips framing in
//! both directions and owns a fresh session per connection.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame as WsCloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use sockjs_core::metric_names::TRANSPORT_REQUESTS_TOTAL;
use sockjs_core::{
    CloseFrame, ConduitReader, Sender, Session, SessionId, SessionState, close_code, conduit,
};
use tracing::{debug, instrument, warn};

use super::{SessionPath, TransportKind, deliver};
use crate::endpoint::EndpointState;
use crate::errors::TransportError;

/// Reason sent with the 1002 close when a client message is not valid JSON.
const BROKEN_FRAMING: &str = "Broken framing.";

/// Decode one framed client message: a JSON array of strings, or a single
/// JSON string. Empty messages carry nothing.
pub fn parse_inbound(text: &str) -> Result<Vec<String>, TransportError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if text.starts_with('[') {
        serde_json::from_str::<Vec<String>>(text).map_err(|_| TransportError::BrokenJson)
    } else {
        serde_json::from_str::<String>(text)
            .map(|message| vec![message])
            .map_err(|_| TransportError::BrokenJson)
    }
}

/// `GET <prefix>/<server>/<session>/websocket`.
pub async fn websocket(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, TransportError> {
    if !state.options.websocket {
        return Err(TransportError::WebSocketDisabled);
    }
    let id = path.session_id()?;
    let upgrade = upgrade.map_err(|_| TransportError::UpgradeRequired)?;
    Ok(upgrade.on_upgrade(move |socket| run_socket(socket, state, id, TransportKind::WebSocket)))
}

/// `GET <prefix>/websocket`.
pub async fn raw_websocket(
    State(state): State<Arc<EndpointState>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, TransportError> {
    if !state.options.websocket {
        return Err(TransportError::WebSocketDisabled);
    }
    let upgrade = upgrade.map_err(|_| TransportError::UpgradeRequired)?;
    let id = SessionId::generate();
    Ok(upgrade.on_upgrade(move |socket| run_socket(socket, state, id, TransportKind::RawWebSocket)))
}

/// Why a socket pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PumpEnd {
    /// The sender was released and everything it wrote was forwarded.
    Drained,
    /// The client closed the socket or the connection failed.
    PeerGone,
    /// The client sent a message that is not valid JSON.
    BrokenFraming,
}

#[instrument(skip_all, fields(session_id = %id, transport = %kind))]
async fn run_socket(socket: WebSocket, state: Arc<EndpointState>, id: SessionId, kind: TransportKind) {
    metrics::counter!(TRANSPORT_REQUESTS_TOTAL, "transport" => kind.name()).increment(1);
    let (session, created) = state.registry.get_or_create(&id);
    debug!(created, "websocket connected");

    let (writer, reader) = conduit(state.options.conduit_capacity);
    let sender = Sender::new(
        &session,
        writer,
        kind.wrapping(None),
        kind.completion(state.options.response_limit),
    );
    let attached = deliver(&session, &sender, kind);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let end = if attached {
        tokio::select! {
            end = forward(&mut ws_tx, reader) => end,
            end = receive(&mut ws_rx, &session, kind) => end,
        }
    } else {
        forward(&mut ws_tx, reader).await
    };

    let close = match end {
        PumpEnd::Drained => closing_frame(&session),
        PumpEnd::PeerGone => None,
        PumpEnd::BrokenFraming => {
            warn!("broken framing, closing socket");
            Some(WsCloseFrame {
                code: close_code::PROTOCOL_ERROR,
                reason: BROKEN_FRAMING.into(),
            })
        }
    };
    if let Err(e) = ws_tx.send(Message::Close(close)).await {
        debug!(error = %e, "close not sent");
    }

    sender.close();
    if kind == TransportKind::RawWebSocket {
        let _ = session.close(close_code::GO_AWAY, "Go away!");
    }
    debug!(?end, "websocket disconnected");
}

/// Close frame to mirror at the WebSocket level once the session is done.
fn closing_frame(session: &Session) -> Option<WsCloseFrame> {
    if session.state() != SessionState::Closed {
        return None;
    }
    session.close_frame().map(|CloseFrame { code, reason }| WsCloseFrame {
        code,
        reason: reason.into(),
    })
}

async fn forward(ws_tx: &mut SplitSink<WebSocket, Message>, mut reader: ConduitReader) -> PumpEnd {
    while let Some(Ok(chunk)) = reader.next().await {
        let text = String::from_utf8_lossy(&chunk).into_owned();
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            return PumpEnd::PeerGone;
        }
    }
    PumpEnd::Drained
}

async fn receive(ws_rx: &mut SplitStream<WebSocket>, session: &Session, kind: TransportKind) -> PumpEnd {
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => t.as_str().to_owned(),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary message");
                    continue;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let messages = if kind == TransportKind::RawWebSocket {
            vec![text]
        } else {
            match parse_inbound(&text) {
                Ok(messages) if messages.is_empty() => continue,
                Ok(messages) => messages,
                Err(_) => return PumpEnd::BrokenFraming,
            }
        };
        if let Err(e) = session.receive(messages) {
            debug!(error = %e, "dropping inbound messages");
        }
    }
    PumpEnd::PeerGone
}
