//! Settings types.
//!
//! Every struct uses `#[serde(default)]`, so a settings file only needs the
//! keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Protocol knobs shared by every endpoint.
    pub sockjs: SockJsSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sockjs.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "sockjs.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.sockjs.sweep_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "sockjs.sweep_interval_ms must be positive".into(),
            ));
        }
        if self.sockjs.response_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "sockjs.response_limit must be positive".into(),
            ));
        }
        if self.sockjs.conduit_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sockjs.conduit_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// How long graceful shutdown waits for in-flight work.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerSettings {
    /// Shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Protocol knobs. None of them are mandated by the wire protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SockJsSettings {
    /// Quiet period before a streaming transport receives `h`.
    pub heartbeat_interval_ms: u64,
    /// Grace period for a session with no attached transport.
    pub disconnect_delay_ms: u64,
    /// How often idle sessions are collected.
    pub sweep_interval_ms: u64,
    /// Framed bytes after which a streaming response is finished.
    pub response_limit: usize,
    /// Whether WebSocket transports are offered.
    pub websocket: bool,
    /// Whether load-balancer sticky cookies are required.
    pub cookie_needed: bool,
    /// Client library loaded by the iframe page.
    pub sockjs_url: String,
    /// Undrained chunks a relay conduit buffers before writes fail.
    pub conduit_capacity: usize,
}

impl Default for SockJsSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            disconnect_delay_ms: 5_000,
            sweep_interval_ms: 1_000,
            response_limit: 128 * 1024,
            websocket: true,
            cookie_needed: false,
            sockjs_url: "https://cdn.jsdelivr.net/npm/sockjs-client@1/dist/sockjs.min.js"
                .to_string(),
            conduit_capacity: 256,
        }
    }
}

impl SockJsSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Disconnect delay as a [`Duration`].
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level filter (`trace`..`error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.sockjs.heartbeat_interval(), Duration::from_secs(25));
        assert_eq!(s.sockjs.disconnect_delay(), Duration::from_secs(5));
        assert_eq!(s.sockjs.response_limit, 131_072);
        assert!(s.sockjs.websocket);
        assert!(!s.sockjs.cookie_needed);
        assert_eq!((s.server.host.as_str(), s.server.port), ("127.0.0.1", 8081));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"sockjs": {"response_limit": 4096}}"#).unwrap();
        assert_eq!(s.sockjs.response_limit, 4096);
        assert_eq!(s.sockjs.conduit_capacity, 256);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn zero_response_limit_rejected() {
        let mut s = Settings::default();
        s.sockjs.response_limit = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("response_limit"));
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut s = Settings::default();
        s.sockjs.heartbeat_interval_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }
}
