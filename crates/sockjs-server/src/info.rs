//! `GET <prefix>/info`: server capabilities and an entropy seed.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::endpoint::EndpointState;
use crate::headers::{APPLICATION_JSON, CACHE_CONTROL_NO_CACHE, options_response};

/// Info response body.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InfoResponse {
    /// Whether WebSocket transports are available.
    pub websocket: bool,
    /// Whether a sticky-session cookie is required.
    pub cookie_needed: bool,
    /// Allowed origins. Always `["*:*"]`.
    pub origins: Vec<String>,
    /// Random number in `0..=u32::MAX`.
    pub entropy: u32,
}

impl InfoResponse {
    /// Build with a fresh entropy value.
    pub fn new(websocket: bool, cookie_needed: bool) -> Self {
        Self {
            websocket,
            cookie_needed,
            origins: vec!["*:*".to_string()],
            entropy: rand::random(),
        }
    }
}

/// `GET <prefix>/info`.
pub async fn info(State(state): State<Arc<EndpointState>>) -> Response {
    let body = InfoResponse::new(state.options.websocket, state.options.cookie_needed);
    match serde_json::to_string(&body) {
        Ok(json) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, APPLICATION_JSON),
                (header::CACHE_CONTROL, CACHE_CONTROL_NO_CACHE),
            ],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize info response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `OPTIONS <prefix>/info`.
pub async fn info_options() -> Response {
    options_response(&[Method::GET])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_wildcard() {
        let info = InfoResponse::new(true, false);
        assert_eq!(info.origins, vec!["*:*"]);
    }

    #[test]
    fn serialization_shape() {
        let info = InfoResponse::new(false, true);
        let json: serde_json::Value = serde_json::to_value(&info).unwrap();
        assert_eq!(json["websocket"], false);
        assert_eq!(json["cookie_needed"], true);
        assert!(json["entropy"].is_u64());
    }

    #[test]
    fn entropy_varies() {
        let values: std::collections::HashSet<u32> =
            (0..8).map(|_| InfoResponse::new(true, false).entropy).collect();
        assert!(values.len() > 1);
    }
}
