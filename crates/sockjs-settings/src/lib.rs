//! # sockjs-settings
//!
//! Layered configuration for the SockJS server.
//!
//! Settings are loaded from three layers, lowest priority first:
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **Settings file**: `sockjs.json` or `$SOCKJS_CONFIG`, deep-merged over defaults
//! 3. **Environment variables**: `SOCKJS_*` overrides, highest priority
//!
//! # Usage
//!
//! ```no_run
//! use sockjs_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with, settings_path,
};
pub use types::{LoggingSettings, ServerSettings, Settings, SockJsSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = Settings::default();
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
