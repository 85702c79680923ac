//! Request-level errors.
//!
//! These never reach a session: they are rejected at the HTTP boundary with a
//! status code and a plain-text body.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use sockjs_core::metric_names::TRANSPORT_ERRORS_TOTAL;
use thiserror::Error;
use tracing::debug;

use crate::headers::{CACHE_CONTROL_NO_CACHE, TEXT_PLAIN};

/// Errors a transport or send endpoint answers with instead of a frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Script transports need a `c` query parameter.
    #[error("\"callback\" parameter required")]
    CallbackRequired,
    /// The `c` parameter contains characters outside `[A-Za-z0-9_.-]`.
    #[error("invalid \"callback\" parameter")]
    InvalidCallback,
    /// Send endpoint received an empty body.
    #[error("Payload expected.")]
    PayloadExpected,
    /// Send endpoint body is not a JSON array of strings.
    #[error("Broken JSON encoding.")]
    BrokenJson,
    /// Send endpoint addressed a session that does not exist or is not open.
    #[error("session not found")]
    SessionNotFound,
    /// Malformed server or session path segment.
    #[error("not found")]
    NotFound,
    /// WebSocket transports are disabled on this endpoint.
    #[error("websocket disabled")]
    WebSocketDisabled,
    /// GET on a WebSocket URL without an upgrade.
    #[error("Can \"Upgrade\" only to \"WebSocket\".")]
    UpgradeRequired,
}

impl TransportError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::CallbackRequired | Self::InvalidCallback | Self::PayloadExpected | Self::BrokenJson => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SessionNotFound | Self::NotFound | Self::WebSocketDisabled => StatusCode::NOT_FOUND,
            Self::UpgradeRequired => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallbackRequired => "callback_required",
            Self::InvalidCallback => "invalid_callback",
            Self::PayloadExpected => "payload_expected",
            Self::BrokenJson => "broken_json",
            Self::SessionNotFound => "session_not_found",
            Self::NotFound => "not_found",
            Self::WebSocketDisabled => "websocket_disabled",
            Self::UpgradeRequired => "upgrade_required",
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        metrics::counter!(TRANSPORT_ERRORS_TOTAL, "kind" => self.kind()).increment(1);
        debug!(kind = self.kind(), status = %self.status(), "request rejected");
        let body = match self.status() {
            StatusCode::NOT_FOUND => String::new(),
            _ => self.to_string(),
        };
        (
            self.status(),
            [
                (header::CONTENT_TYPE, TEXT_PLAIN),
                (header::CACHE_CONTROL, CACHE_CONTROL_NO_CACHE),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_messages_are_literal() {
        assert_eq!(
            TransportError::CallbackRequired.to_string(),
            "\"callback\" parameter required"
        );
        assert_eq!(
            TransportError::InvalidCallback.to_string(),
            "invalid \"callback\" parameter"
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(TransportError::PayloadExpected.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(TransportError::BrokenJson.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(TransportError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(TransportError::UpgradeRequired.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_is_plain_text_and_uncached() {
        let resp = TransportError::BrokenJson.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], CACHE_CONTROL_NO_CACHE);
    }

    #[test]
    fn rejections_are_counted_by_kind() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let _ = TransportError::BrokenJson.into_response();
            let _ = TransportError::BrokenJson.into_response();
            let _ = TransportError::SessionNotFound.into_response();
        });
        let rendered = handle.render();
        assert!(rendered.contains(r#"sockjs_transport_errors_total{kind="broken_json"} 2"#));
        assert!(rendered.contains(r#"sockjs_transport_errors_total{kind="session_not_found"} 1"#));
    }

    #[test]
    fn kinds_are_snake_case() {
        for err in [
            TransportError::CallbackRequired,
            TransportError::SessionNotFound,
            TransportError::UpgradeRequired,
        ] {
            assert!(err.kind().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
