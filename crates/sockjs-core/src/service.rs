//! Application hook.
//!
//! Defines the [`SessionService`] trait the registry calls for every session
//! event. Events for one session are delivered in order by a single task, so
//! implementations never see `on_message` before `on_open` or after
//! `on_close`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::frame::CloseFrame;
use crate::session::Session;

/// Application logic attached to every session of an endpoint.
///
/// # Sending
///
/// Use [`Session::send`] or [`Session::send_all`] from any callback. Messages
/// queue until a transport is attached.
///
/// # Closing
///
/// [`Session::close`] from `on_open` or `on_message` closes the session; the
/// client receives the close frame on its current or next transport request.
#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    /// The open frame was delivered.
    async fn on_open(&self, _session: &Arc<Session>) {}

    /// The client sent a message.
    async fn on_message(&self, session: &Arc<Session>, message: String);

    /// The session closed. Last callback for this session.
    async fn on_close(&self, _session: &Arc<Session>, _close: &CloseFrame) {}
}
