//! Layered configuration for the relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`Settings::default()`]
//! 2. **Settings file** — `sala.json` next to the process (or the path in
//!    `SALA_SETTINGS`), deep-merged over defaults
//! 3. **Environment variables** — `SALA_HOST` / `SALA_PORT` (highest priority)
//!
//! Load failures never abort startup here: a broken file logs a warning and
//! falls back to defaults, matching the rest of the relay's
//! no-single-failure-is-fatal posture. Callers that need the error use
//! [`load_from_path`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Settings loading failure.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for [`Settings`].
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level relay settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Server bind settings.
    pub server: ServerSettings,
}

/// Bind address settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
        }
    }
}

impl Settings {
    /// The `host:port` string handed to the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Path of the settings file: `SALA_SETTINGS` if set, else `sala.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    std::env::var("SALA_SETTINGS")
        .map_or_else(|_| PathBuf::from("sala.json"), PathBuf::from)
}

/// Load settings: file (if present) deep-merged over defaults, then env
/// overrides. Falls back to defaults (plus env) on any load failure.
#[must_use]
pub fn load() -> Settings {
    let path = settings_path();
    let mut settings = if path.exists() {
        match load_from_path(&path) {
            Ok(s) => s,
            Err(error) => {
                warn!(error = %error, ?path, "failed to load settings, using defaults");
                Settings::default()
            }
        }
    } else {
        Settings::default()
    };
    apply_env_overrides(&mut settings);
    settings
}

/// Load settings from a specific file, deep-merged over defaults.
pub fn load_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let raw = std::fs::read_to_string(path)?;
    let file_value: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(Settings::default())?;
    let merged = deep_merge(defaults, file_value);
    Ok(serde_json::from_value(merged)?)
}

/// Recursively merge `overlay` onto `base`; overlay wins on conflicts,
/// objects merge key-by-key, everything else replaces wholesale.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(host) = std::env::var("SALA_HOST") {
        settings.server.host = host;
    }
    if let Ok(port) = std::env::var("SALA_PORT") {
        match port.parse() {
            Ok(port) => settings.server.port = port,
            Err(_) => warn!(value = %port, "ignoring non-numeric SALA_PORT"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that touch `SALA_*` env vars must hold this lock to avoid
    /// racing with each other (Rust runs tests in parallel threads).
    static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn defaults_match_the_reference_bind() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sala.json");
        std::fs::write(&path, r#"{"server": {"port": 9000}}"#).unwrap();

        let settings = load_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        // Unset fields keep their defaults (deep merge).
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sala.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_from_path(&path),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_from_path(Path::new("/nonexistent/sala.json")),
            Err(SettingsError::Io(_))
        ));
    }

    #[test]
    fn env_overrides_take_highest_priority() {
        let _lock = ENV_MUTEX.lock().unwrap();
        std::env::set_var("SALA_HOST", "0.0.0.0");
        std::env::set_var("SALA_PORT", "8100");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);
        assert_eq!(settings.bind_addr(), "0.0.0.0:8100");

        std::env::remove_var("SALA_HOST");
        std::env::remove_var("SALA_PORT");
    }

    #[test]
    fn non_numeric_port_override_is_ignored() {
        let _lock = ENV_MUTEX.lock().unwrap();
        std::env::set_var("SALA_PORT", "not-a-port");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);
        assert_eq!(settings.server.port, 8000);

        std::env::remove_var("SALA_PORT");
    }

    #[test]
    fn deep_merge_merges_nested_objects() {
        let base = serde_json::json!({"server": {"host": "127.0.0.1", "port": 8000}});
        let overlay = serde_json::json!({"server": {"port": 9000}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["server"]["host"], "127.0.0.1");
        assert_eq!(merged["server"]["port"], 9000);
    }

    #[test]
    fn deep_merge_replaces_non_objects() {
        let merged = deep_merge(serde_json::json!([1, 2]), serde_json::json!([3]));
        assert_eq!(merged, serde_json::json!([3]));
    }
}
