//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SOCKJS_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::Settings;

/// Default settings file: `$SOCKJS_CONFIG`, or `sockjs.json` in the working
/// directory.
pub fn settings_path() -> PathBuf {
    std::env::var_os("SOCKJS_CONFIG").map_or_else(|| PathBuf::from("sockjs.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). Invalid
/// JSON or a value [`Settings::validate`] rejects is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_settings_from_path`] but reads overrides through `lookup`
/// instead of the process environment.
pub fn load_settings_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SOCKJS_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are ignored with a
/// warning.
pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SOCKJS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("SOCKJS_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Protocol ────────────────────────────────────────────────────
    if let Some(v) = env.u64("SOCKJS_HEARTBEAT_INTERVAL_MS", 100, 3_600_000) {
        settings.sockjs.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("SOCKJS_DISCONNECT_DELAY_MS", 0, 3_600_000) {
        settings.sockjs.disconnect_delay_ms = v;
    }
    if let Some(v) = env.usize("SOCKJS_RESPONSE_LIMIT", 1, 1 << 30) {
        settings.sockjs.response_limit = v;
    }
    if let Some(v) = env.bool("SOCKJS_WEBSOCKET") {
        settings.sockjs.websocket = v;
    }
    if let Some(v) = env.bool("SOCKJS_COOKIE_NEEDED") {
        settings.sockjs.cookie_needed = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SOCKJS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("SOCKJS_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"sockjs": {"websocket": true, "response_limit": 10}});
        let source = serde_json::json!({"sockjs": {"response_limit": 20}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["sockjs"]["response_limit"], 20);
        assert_eq!(merged["sockjs"]["websocket"], true);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_with ──────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_with(Path::new("/nonexistent/sockjs.json"), no_env).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockjs.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9999}, "sockjs": {"response_limit": 4096, "websocket": false}}"#,
        )
        .unwrap();

        let settings = load_settings_with(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sockjs.response_limit, 4096);
        assert!(!settings.sockjs.websocket);
        assert_eq!(settings.sockjs.heartbeat_interval_ms, 25_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockjs.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_with(&path, no_env),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockjs.json");
        std::fs::write(&path, r#"{"sockjs": {"conduit_capacity": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_with(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sockjs.json");
        std::fs::write(&path, r#"{"server": {"port": 9999}}"#).unwrap();

        let env = env_of(&[
            ("SOCKJS_PORT", "7000"),
            ("SOCKJS_COOKIE_NEEDED", "yes"),
            ("SOCKJS_LOG_JSON", "1"),
            ("SOCKJS_LOG_LEVEL", "debug"),
        ]);
        let settings = load_settings_with(&path, env).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert!(settings.sockjs.cookie_needed);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("SOCKJS_PORT", "99999"),
                ("SOCKJS_WEBSOCKET", "maybe"),
                ("SOCKJS_RESPONSE_LIMIT", "0"),
                ("SOCKJS_HOST", ""),
            ]),
        );
        assert_eq!(settings, Settings::default());
    }

    // ── parse helpers ───────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("25000", 100, 3_600_000), Some(25_000));
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("4096", 1, 1 << 30), Some(4096));
        assert_eq!(parse_usize_range("abc", 1, 10), None);
    }
}
