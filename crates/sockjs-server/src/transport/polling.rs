//! Single-shot transports: `xhr` and `jsonp`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;

use super::{CallbackQuery, SessionPath, TransportKind, serve_http};
use crate::endpoint::EndpointState;
use crate::errors::TransportError;
use crate::headers::options_response;

/// `POST <prefix>/<server>/<session>/xhr`.
pub async fn xhr(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
) -> Result<Response, TransportError> {
    let id = path.session_id()?;
    Ok(serve_http(&state, &id, TransportKind::Xhr, None, &headers))
}

/// `OPTIONS <prefix>/<server>/<session>/xhr`.
pub async fn xhr_options() -> Response {
    options_response(&[Method::POST])
}

/// `GET <prefix>/<server>/<session>/jsonp?c=<callback>`.
pub async fn jsonp(
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
        TransportKind::Jsonp,
        Some(callback),
        &headers,
    ))
}
