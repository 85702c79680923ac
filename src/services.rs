//! Application services mounted by the binary.

use std::sync::Arc;

use async_trait::async_trait;
use sockjs_core::{Session, SessionService, close_code};
use tracing::debug;

/// Sends every message straight back.
pub struct EchoService;

#[async_trait]
impl SessionService for EchoService {
    async fn on_message(&self, session: &Arc<Session>, message: String) {
        if let Err(e) = session.send(message) {
            debug!(session_id = %session.id(), error = %e, "echo dropped");
        }
    }
}

/// Closes each session with `3000 "Go away!"` as soon as it opens.
pub struct CloseService;

#[async_trait]
impl SessionService for CloseService {
    async fn on_open(&self, session: &Arc<Session>) {
        let _ = session.close(close_code::GO_AWAY, "Go away!");
    }

    async fn on_message(&self, _session: &Arc<Session>, _message: String) {}
}
