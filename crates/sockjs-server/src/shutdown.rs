//! Server shutdown.
//!
//! The coordinator knows every endpoint's session registry. It starts their
//! heartbeat and sweep loops under one `CancellationToken`, and on shutdown
//! closes every session with `c[3000,"Go away!"]` before cancelling the loops
//! and waiting for them with a bound.

use std::sync::Arc;
use std::time::Duration;

use sockjs_core::{SessionRegistry, close_code};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const GO_AWAY_REASON: &str = "Go away!";

/// Owns the shutdown sequence of every mounted endpoint.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registries: Vec<Arc<SessionRegistry>>,
}

impl ShutdownCoordinator {
    /// A coordinator with no registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include `registry` in maintenance and shutdown.
    pub fn track(&mut self, registry: Arc<SessionRegistry>) {
        self.registries.push(registry);
    }

    /// Token cancelled once shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn the heartbeat and sweep loop of every tracked registry.
    pub fn start_maintenance(&self) -> Vec<JoinHandle<()>> {
        self.registries
            .iter()
            .map(|registry| registry.start_maintenance(self.token.child_token()))
            .collect()
    }

    /// Close every session with `3000 "Go away!"`, then cancel the token.
    /// Returns how many sessions were still open. Only the first call closes
    /// anything.
    pub fn begin(&self) -> usize {
        if self.is_shutting_down() {
            return 0;
        }
        let closed = self
            .registries
            .iter()
            .map(|registry| registry.close_all(close_code::GO_AWAY, GO_AWAY_REASON))
            .sum();
        info!(closed, registries = self.registries.len(), "closing sessions for shutdown");
        self.token.cancel();
        closed
    }

    /// Begin shutdown if needed, then wait up to `timeout` for the
    /// maintenance loops in `handles`.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        let _ = self.begin();
        debug!(task_count = handles.len(), ?timeout, "waiting for maintenance loops");

        let loops = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, loops).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, maintenance loops still running");
        }
        let lingering: usize = self.registries.iter().map(|r| r.len()).sum();
        info!(lingering, "session maintenance drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use sockjs_core::{
        CloseFrame, Completion, Delivery, RegistryConfig, Sender, Session, SessionId, SessionService,
        SessionState, Wrapping, conduit,
    };

    struct Silent;

    #[async_trait]
    impl SessionService for Silent {
        async fn on_message(&self, _session: &Arc<Session>, _message: String) {}
    }

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(Arc::new(Silent), RegistryConfig::default()))
    }

    fn open(registry: &SessionRegistry, id: &str) -> Arc<Session> {
        let (session, _) = registry.get_or_create(&SessionId::from_raw(id));
        let (writer, _reader) = conduit(4);
        let sender = Sender::new(&session, writer, Wrapping::Line, Completion::SingleShot);
        assert_eq!(session.open(&sender), Ok(Some(Delivery::Complete)));
        session
    }

    #[test]
    fn not_shutting_down_initially() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[tokio::test]
    async fn begin_closes_sessions_of_every_registry_once() {
        let (a, b) = (registry(), registry());
        let mut coord = ShutdownCoordinator::new();
        coord.track(Arc::clone(&a));
        coord.track(Arc::clone(&b));
        let first = open(&a, "x");
        let second = open(&b, "y");
        let token = coord.token();

        assert_eq!(coord.begin(), 2);
        assert!(token.is_cancelled());
        assert_eq!(first.state(), SessionState::Closing);
        assert_eq!(second.close_frame(), Some(CloseFrame::go_away()));
        assert_eq!(coord.begin(), 0);
    }

    #[tokio::test]
    async fn attached_stream_receives_go_away_on_begin() {
        let reg = registry();
        let mut coord = ShutdownCoordinator::new();
        coord.track(Arc::clone(&reg));
        let session = open(&reg, "s");
        let (writer, mut reader) = conduit(8);
        let stream = Sender::new(&session, writer, Wrapping::Line, Completion::Stream { byte_limit: None });
        session.attach(stream).unwrap();

        let _ = coord.begin();
        let chunk = reader.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"c[3000,\"Go away!\"]\n");
        assert!(reader.next().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn drain_stops_maintenance_loops() {
        let mut coord = ShutdownCoordinator::new();
        coord.track(registry());
        coord.track(registry());
        let handles = coord.start_maintenance();
        assert_eq!(handles.len(), 2);

        coord.drain(handles, Duration::from_secs(5)).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        coord.drain(vec![stuck], Duration::from_millis(50)).await;
        assert!(coord.is_shutting_down());
    }
}
