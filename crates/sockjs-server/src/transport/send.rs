//! Client-to-server endpoints for the HTTP transports.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use sockjs_core::{Session, SessionError, SessionId};
use tracing::debug;

use super::SessionPath;
use crate::endpoint::EndpointState;
use crate::errors::TransportError;
use crate::headers::{TEXT_PLAIN, no_cache, options_response, session_cookie};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Decode a send body: a JSON array of strings.
pub fn decode_messages(body: &[u8]) -> Result<Vec<String>, TransportError> {
    if body.is_empty() {
        return Err(TransportError::PayloadExpected);
    }
    serde_json::from_slice(body).map_err(|_| TransportError::BrokenJson)
}

/// Extract the JSON payload of a `jsonp_send` body: the `d` field of a form,
/// or the raw body otherwise.
pub fn jsonp_payload(headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(FORM_URLENCODED));
    if !is_form {
        return body.to_vec();
    }
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "d")
        .map(|(_, value)| value.into_owned().into_bytes())
        .unwrap_or_default()
}

/// `POST <prefix>/<server>/<session>/xhr_send`.
pub async fn xhr_send(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, TransportError> {
    let session = open_session(&state, &path.session_id()?)?;
    deliver(&session, decode_messages(&body)?)?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    finish_headers(&state, &headers, &mut response);
    Ok(response)
}

/// `OPTIONS <prefix>/<server>/<session>/xhr_send`.
pub async fn xhr_send_options() -> Response {
    options_response(&[Method::POST])
}

/// `POST <prefix>/<server>/<session>/jsonp_send`.
pub async fn jsonp_send(
    State(state): State<Arc<EndpointState>>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, TransportError> {
    let session = open_session(&state, &path.session_id()?)?;
    let payload = jsonp_payload(&headers, &body);
    deliver(&session, decode_messages(&payload)?)?;

    let mut response = (StatusCode::OK, "ok").into_response();
    finish_headers(&state, &headers, &mut response);
    Ok(response)
}

fn open_session(state: &EndpointState, id: &SessionId) -> Result<Arc<Session>, TransportError> {
    state
        .registry
        .get(id)
        .filter(|s| s.is_open())
        .ok_or(TransportError::SessionNotFound)
}

fn deliver(session: &Session, messages: Vec<String>) -> Result<(), TransportError> {
    let count = messages.len();
    session.receive(messages).map_err(|e| match e {
        SessionError::NotOpen | SessionError::Closed => TransportError::SessionNotFound,
    })?;
    debug!(session_id = %session.id(), count, "messages received");
    Ok(())
}

fn finish_headers(state: &EndpointState, request: &HeaderMap, response: &mut Response) {
    let headers = response.headers_mut();
    let _ = headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    no_cache(headers);
    if state.options.cookie_needed {
        let _ = headers.insert(header::SET_COOKIE, session_cookie(request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_payload_expected() {
        assert_eq!(decode_messages(b""), Err(TransportError::PayloadExpected));
    }

    #[test]
    fn non_array_is_broken_json() {
        assert_eq!(decode_messages(b"{"), Err(TransportError::BrokenJson));
        assert_eq!(decode_messages(b"\"x\""), Err(TransportError::BrokenJson));
        assert_eq!(decode_messages(b"[1]"), Err(TransportError::BrokenJson));
    }

    #[test]
    fn array_of_strings_decodes_in_order() {
        assert_eq!(
            decode_messages(br#"["a","b\u0000c"]"#).unwrap(),
            vec!["a".to_string(), "b\u{0}c".to_string()]
        );
        assert!(decode_messages(b"[]").unwrap().is_empty());
    }

    #[test]
    fn jsonp_form_field() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let payload = jsonp_payload(&headers, b"d=%5B%22x%22%5D");
        assert_eq!(payload, br#"["x"]"#);
        assert!(jsonp_payload(&headers, b"e=1").is_empty());
    }

    #[test]
    fn jsonp_raw_body() {
        let payload = jsonp_payload(&HeaderMap::new(), br#"["x"]"#);
        assert_eq!(payload, br#"["x"]"#);
    }
}
