//! Streaming transports: `xhr_streaming`, `eventsource` and `htmlfile`.
//!
//! Each response stays open until the byte cap is crossed between two
//! frames, the session closes, or the client hangs up.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;

use super::{CallbackQuery, SessionPath, TransportKind, serve_http};
use crate::endpoint::EndpointState;
use crate::errors::TransportError;
use crate::headers::options_response;

/// `POST <prefix>/<server>/<session>/xhr_streaming`.
pub async fn xhr_streaming(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
) -> Result<Response, TransportError> {
    let id = path.session_id()?;
    Ok(serve_http(
        &state,
        &id,
        TransportKind::XhrStreaming,
        None,
        &headers,
    ))
}

/// `OPTIONS <prefix>/<server>/<session>/xhr_streaming`.
pub async fn xhr_streaming_options() -> Response {
    options_response(&[Method::POST])
}

/// `GET <prefix>/<server>/<session>/eventsource`.
pub async fn eventsource(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
) -> Result<Response, TransportError> {
    let id = path.session_id()?;
    Ok(serve_http(
        &state,
        &id,
        TransportKind::EventSource,
        None,
        &headers,
    ))
}

/// `GET <prefix>/<server>/<session>/htmlfile?c=<callback>`.
pub async fn htmlfile(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, TransportError> {
    let id = path.session_id()?;
    let callback = query.callback()?;
    Ok(serve_http(
        &state,
        &id,
        TransportKind::HtmlFile,
        Some(callback),
        &headers,
    ))
}
