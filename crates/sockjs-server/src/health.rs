//! `/health` endpoint: uptime plus per-endpoint session counts.

use std::time::Instant;

use serde::Serialize;

use crate::endpoint::Endpoint;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"shutting_down"` once sessions are being closed.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions registered across all endpoints.
    pub sessions: usize,
    /// Breakdown in mount order.
    pub endpoints: Vec<EndpointHealth>,
}

/// Sessions of one mounted endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    /// URL prefix (`"/"` for the root).
    pub prefix: String,
    /// Registered sessions, open or lingering.
    pub sessions: usize,
}

/// Build a health response from the live registries.
pub fn health_check<'a>(
    start_time: Instant,
    shutting_down: bool,
    endpoints: impl IntoIterator<Item = &'a Endpoint>,
) -> HealthResponse {
    let endpoints: Vec<EndpointHealth> = endpoints
        .into_iter()
        .map(|e| EndpointHealth {
            prefix: if e.prefix().is_empty() { "/".into() } else { e.prefix().to_owned() },
            sessions: e.registry().len(),
        })
        .collect();
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        sessions: endpoints.iter().map(|e| e.sessions).sum(),
        endpoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use sockjs_core::{Session, SessionId, SessionService};

    use crate::config::EndpointOptions;

    struct Silent;

    #[async_trait]
    impl SessionService for Silent {
        async fn on_message(&self, _session: &Arc<Session>, _message: String) {}
    }

    fn endpoint(prefix: &str) -> Endpoint {
        Endpoint::new(prefix, Arc::new(Silent), EndpointOptions::default())
    }

    #[tokio::test]
    async fn counts_sessions_per_endpoint() {
        let echo = endpoint("/echo");
        let root = endpoint("/");
        let _ = echo.registry().get_or_create(&SessionId::from_raw("a"));
        let _ = echo.registry().get_or_create(&SessionId::from_raw("b"));

        let resp = health_check(Instant::now(), false, [&echo, &root]);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.sessions, 2);
        assert_eq!(resp.endpoints[0].prefix, "/echo");
        assert_eq!(resp.endpoints[0].sessions, 2);
        assert_eq!(resp.endpoints[1].prefix, "/");
        assert_eq!(resp.endpoints[1].sessions, 0);
    }

    #[test]
    fn reports_shutdown() {
        let resp = health_check(Instant::now(), true, []);
        assert_eq!(resp.status, "shutting_down");
        assert_eq!(resp.sessions, 0);
        assert!(resp.endpoints.is_empty());
    }

    #[test]
    fn uptime_and_serialization() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let parsed = serde_json::to_value(health_check(start, false, [])).unwrap();
        assert!(parsed["uptime_secs"].as_u64().unwrap() >= 59);
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["endpoints"].as_array().unwrap().is_empty());
    }
}
