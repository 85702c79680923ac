//! Server and endpoint configuration.

use std::time::Duration;

use sockjs_core::RegistryConfig;
use sockjs_settings::{ServerSettings, SockJsSettings};

/// Listener configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// How long graceful shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

/// Per-endpoint protocol options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Quiet period before a streaming transport receives `h`.
    pub heartbeat_interval: Duration,
    /// Grace period for a session with no attached transport.
    pub disconnect_delay: Duration,
    /// Idle sweep period.
    pub sweep_interval: Duration,
    /// Framed bytes after which a streaming response is finished.
    pub response_limit: usize,
    /// Whether the WebSocket transports are offered.
    pub websocket: bool,
    /// Whether transport responses carry a `JSESSIONID` cookie.
    pub cookie_needed: bool,
    /// Client library loaded by the iframe page.
    pub sockjs_url: String,
    /// Undrained chunks a relay conduit buffers.
    pub conduit_capacity: usize,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self::from(&SockJsSettings::default())
    }
}

impl From<&SockJsSettings> for EndpointOptions {
    fn from(settings: &SockJsSettings) -> Self {
        Self {
            heartbeat_interval: settings.heartbeat_interval(),
            disconnect_delay: settings.disconnect_delay(),
            sweep_interval: settings.sweep_interval(),
            response_limit: settings.response_limit,
            websocket: settings.websocket,
            cookie_needed: settings.cookie_needed,
            sockjs_url: settings.sockjs_url.clone(),
            conduit_capacity: settings.conduit_capacity,
        }
    }
}

impl EndpointOptions {
    /// Timing knobs for the endpoint's session registry.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            heartbeat_interval: self.heartbeat_interval,
            disconnect_delay: self.disconnect_delay,
            sweep_interval: self.sweep_interval,
        }
    }

    /// Same options with WebSocket transports turned off.
    #[must_use]
    pub fn without_websocket(mut self) -> Self {
        self.websocket = false;
        self
    }

    /// Same options with the sticky-session cookie turned on.
    #[must_use]
    pub fn with_cookie_needed(mut self) -> Self {
        self.cookie_needed = true;
        self
    }

    /// Same options with a different streaming byte cap.
    #[must_use]
    pub fn with_response_limit(mut self, limit: usize) -> Self {
        self.response_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn server_config_from_settings() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9000,
            shutdown_timeout_ms: 250,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn options_follow_settings_defaults() {
        let opts = EndpointOptions::default();
        assert_eq!(opts.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(opts.disconnect_delay, Duration::from_secs(5));
        assert_eq!(opts.response_limit, 131_072);
        assert!(opts.websocket);
        assert!(!opts.cookie_needed);
    }

    #[test]
    fn builders_flip_single_fields() {
        let opts = EndpointOptions::default()
            .without_websocket()
            .with_cookie_needed()
            .with_response_limit(4096);
        assert!(!opts.websocket);
        assert!(opts.cookie_needed);
        assert_eq!(opts.response_limit, 4096);
        assert_eq!(opts.registry_config().sweep_interval, Duration::from_secs(1));
    }
}
