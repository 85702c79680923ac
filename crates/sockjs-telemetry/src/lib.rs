//! # sockjs-telemetry
//!
//! `tracing` subscriber setup: an `EnvFilter` (`RUST_LOG` wins over the
//! configured levels) in front of a JSON or human-readable `fmt` layer. The
//! returned [`TelemetryGuard`] can change per-module levels at runtime.

#![deny(unsafe_code)]

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialised: {0}")]
    AlreadyInitialized(String),
    /// A level string did not parse.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// The filter could not be swapped at runtime.
    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `"sockjs_core"` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of pretty output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a level name such as `"debug"`.
    pub fn from_level_name(level: &str, json: bool) -> Result<Self, TelemetryError> {
        Ok(Self {
            log_level: parse_level(level)?,
            module_levels: Vec::new(),
            json,
        })
    }
}

/// Parse `trace`, `debug`, `info`, `warn` or `error` (any case).
pub fn parse_level(level: &str) -> Result<Level, TelemetryError> {
    Level::from_str(level.trim()).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))
}

/// Render the filter directives for a default level plus module overrides.
pub fn filter_directives(level: Level, module_levels: &[(String, Level)]) -> String {
    let mut directives = level.to_string().to_lowercase();
    for (module, level) in module_levels {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(&level.to_string().to_lowercase());
    }
    directives
}

/// Handle to the installed subscriber.
pub struct TelemetryGuard {
    default_level: Level,
    level_filter: Arc<RwLock<Vec<(String, Level)>>>,
    reload: reload::Handle<EnvFilter, Registry>,
}

impl TelemetryGuard {
    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&self, module: &str, level: Level) -> Result<(), TelemetryError> {
        let directives = {
            let mut levels = self.level_filter.write();
            if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
                entry.1 = level;
            } else {
                levels.push((module.to_string(), level));
            }
            filter_directives(self.default_level, &levels)
        };
        self.reload
            .reload(EnvFilter::new(directives))
            .map_err(|e| TelemetryError::Reload(e.to_string()))
    }

    /// Get current per-module log level overrides.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.level_filter.read().clone()
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("default_level", &self.default_level)
            .field("module_levels", &*self.level_filter.read())
            .finish_non_exhaustive()
    }
}

/// Initialize the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let (filter_layer, reload) = reload::Layer::new(env_filter);

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let pretty_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(TelemetryGuard {
        default_level: config.log_level,
        level_filter: Arc::new(RwLock::new(config.module_levels.clone())),
        reload,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_without_modules() {
        assert_eq!(filter_directives(Level::WARN, &[]), "warn");
    }

    #[test]
    fn directives_with_modules() {
        let modules = vec![
            ("sockjs_core".to_string(), Level::DEBUG),
            ("tower_http".to_string(), Level::TRACE),
        ];
        assert_eq!(
            filter_directives(Level::INFO, &modules),
            "info,sockjs_core=debug,tower_http=trace"
        );
    }

    #[test]
    fn parse_level_accepts_any_case() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" warn ").unwrap(), Level::WARN);
        assert!(matches!(
            parse_level("loud"),
            Err(TelemetryError::InvalidLevel(_))
        ));
    }

    #[test]
    fn config_from_level_name() {
        let config = TelemetryConfig::from_level_name("error", true).unwrap();
        assert_eq!(config.log_level, Level::ERROR);
        assert!(config.json);
        assert!(TelemetryConfig::from_level_name("nope", false).is_err());
    }

    #[test]
    fn init_once_then_adjust_levels() {
        let guard = init_telemetry(&TelemetryConfig::default()).unwrap();
        guard.set_module_level("sockjs_core", Level::DEBUG).unwrap();
        guard.set_module_level("sockjs_core", Level::TRACE).unwrap();
        assert_eq!(
            guard.module_levels(),
            vec![("sockjs_core".to_string(), Level::TRACE)]
        );
        assert!(matches!(
            init_telemetry(&TelemetryConfig::default()),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
