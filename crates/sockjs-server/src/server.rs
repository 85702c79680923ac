//! `SockJsServer`: mounts endpoints on one listener and owns their lifecycle.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// State for the server-wide routes.
#[derive(Clone)]
struct AppState {
    start_time: Instant,
    endpoints: Arc<[Endpoint]>,
    shutdown: CancellationToken,
    metrics: Option<PrometheusHandle>,
}

/// HTTP server hosting any number of SockJS endpoints.
pub struct SockJsServer {
    config: ServerConfig,
    endpoints: Vec<Endpoint>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl SockJsServer {
    /// Create a server with no endpoints.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            endpoints: Vec::new(),
            shutdown: ShutdownCoordinator::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Mount an endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.shutdown.track(Arc::clone(endpoint.registry()));
        self.endpoints.push(endpoint);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the router: every endpoint plus `/health` and `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            start_time: self.start_time,
            endpoints: self.endpoints.clone().into(),
            shutdown: self.shutdown.token(),
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);
        for endpoint in &self.endpoints {
            router = router.merge(endpoint.router());
        }
        router.layer(TraceLayer::new_for_http())
    }

    /// Mounted endpoints.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind((self.config.host.as_str(), self.config.port)).await
    }

    /// Start heartbeat and sweep loops for every endpoint. They stop when
    /// shutdown begins.
    pub fn start_maintenance(&self) -> Vec<JoinHandle<()>> {
        self.shutdown.start_maintenance()
    }

    /// Close every session with `c[3000,"Go away!"]` and signal shutdown.
    /// Returns how many sessions were still open.
    pub fn begin_shutdown(&self) -> usize {
        self.shutdown.begin()
    }

    /// Serve on `listener` until shutdown is signalled, then wait for the
    /// maintenance loops.
    pub async fn run(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, endpoints = self.endpoints.len(), "sockjs server listening");

        let handles = self.start_maintenance();
        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        self.shutdown
            .drain(handles, self.config.shutdown_timeout)
            .await;
        info!("sockjs server stopped");
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_cancelled(),
        state.endpoints.iter(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(&handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
