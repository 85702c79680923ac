//! Session registry.
//!
//! Owns every live session of one endpoint, spawns the per-session event
//! dispatcher that drives the [`SessionService`], and runs the periodic
//! heartbeat and idle sweep.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ids::SessionId;
use crate::metric_names::{SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL, SESSIONS_EXPIRED_TOTAL};
use crate::service::SessionService;
use crate::session::{Session, SessionEvent};

/// Timing knobs for one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Quiet period after which a streaming sender gets an `h` frame.
    pub heartbeat_interval: Duration,
    /// How long a session may sit without a sender before it is reclaimed.
    pub disconnect_delay: Duration,
    /// How often the idle sweep runs.
    pub sweep_interval: Duration,
}

impl RegistryConfig {
    /// How often quiet senders are checked for a due heartbeat. Never longer
    /// than the sweep interval, so a sender that attaches between two checks
    /// still gets its `h` within one sweep interval of falling due.
    pub fn heartbeat_check_period(&self) -> Duration {
        self.heartbeat_interval.min(self.sweep_interval)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            disconnect_delay: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Result of one idle sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions moved to `Closed` by this sweep.
    pub expired: usize,
    /// Sessions dropped from the registry.
    pub removed: usize,
}

/// Concurrent map of session id to session.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    service: Arc<dyn SessionService>,
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create an empty registry driving `service`.
    pub fn new(service: Arc<dyn SessionService>, config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            service,
            config,
        }
    }

    /// Timing configuration.
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a session, creating it in `Connecting` if absent. The flag is
    /// `true` when this call created it. Concurrent callers with the same id
    /// all get the same session and exactly one of them sees `true`.
    pub fn get_or_create(&self, id: &SessionId) -> (Arc<Session>, bool) {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let session = Arc::new(Session::new(id.clone(), tx));
                let _ = entry.insert(Arc::clone(&session));
                drop(tokio::spawn(dispatch(
                    Arc::clone(&session),
                    Arc::clone(&self.service),
                    rx,
                )));
                metrics::counter!(SESSIONS_CREATED_TOTAL).increment(1);
                metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);
                debug!(session_id = %id, "session created");
                (session, true)
            }
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Expire and drop every session that has had no sender for
    /// `disconnect_delay`. Explicitly closed sessions linger until then too,
    /// so late polls still see their close frame.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, self.config.disconnect_delay))
            .map(|entry| entry.key().clone())
            .collect();

        let mut report = SweepReport::default();
        for id in idle {
            let removed = self
                .sessions
                .remove_if(&id, |_, session| session.is_idle(now, self.config.disconnect_delay));
            if let Some((_, session)) = removed {
                if session.expire() {
                    report.expired += 1;
                    metrics::counter!(SESSIONS_EXPIRED_TOTAL).increment(1);
                }
                report.removed += 1;
                metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
                debug!(session_id = %id, "idle session removed");
            }
        }
        report
    }

    /// Send heartbeats on every quiet streaming sender. Returns how many were
    /// written.
    pub fn heartbeat(&self) -> usize {
        let interval = self.config.heartbeat_interval;
        self.sessions
            .iter()
            .filter(|entry| entry.value().heartbeat(interval))
            .count()
    }

    /// Close every session with the same code and reason. Returns how many
    /// were still open.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions
            .iter()
            .filter(|session| session.close(code, reason))
            .count()
    }

    /// Spawn the heartbeat and sweep loop. Stops when `cancel` fires.
    pub fn start_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(registry.config.heartbeat_check_period());
            let mut sweep = tokio::time::interval(registry.config.sweep_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = heartbeat.tick() => {
                        let sent = registry.heartbeat();
                        if sent > 0 {
                            debug!(sent, "heartbeats sent");
                        }
                    }
                    _ = sweep.tick() => {
                        let report = registry.sweep();
                        if report.removed > 0 {
                            info!(expired = report.expired, removed = report.removed, "idle session sweep");
                        }
                    }
                }
            }
            debug!("session maintenance stopped");
        })
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Per-session event loop. Holds the session alive until its close event has
/// been handled.
async fn dispatch(
    session: Arc<Session>,
    service: Arc<dyn SessionService>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Opened => service.on_open(&session).await,
            SessionEvent::Message(message) => service.on_message(&session, message).await,
            SessionEvent::Closed(close) => {
                service.on_close(&session, &close).await;
                break;
            }
        }
    }
    debug!(session_id = %session.id(), "session dispatcher finished");
}
