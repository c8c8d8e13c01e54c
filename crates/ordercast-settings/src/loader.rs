//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ORDERCAST_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ClientSettings;

/// Default settings file location (`$HOME/.ordercast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ordercast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults. Invalid JSON or a result that fails
/// [`ClientSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ClientSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
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

/// Apply environment overrides read through `lookup`.
///
/// Integers must parse and fall within range; invalid values are ignored
/// with a warning so a bad variable never prevents startup.
pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("ORDERCAST_SERVER_URL") {
        settings.server.url = v;
    }
    if let Some(v) = env.string("ORDERCAST_NAMESPACE") {
        settings.server.namespace = v;
    }
    if let Some(v) = env.string("ORDERCAST_PLATFORM") {
        settings.server.platform = v;
    }
    if let Some(v) = env.u64("ORDERCAST_CONNECT_TIMEOUT_MS", 1000, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64("ORDERCAST_RECONNECTION_ATTEMPTS", 0, 1000) {
        #[allow(clippy::cast_possible_truncation)]
        let attempts = v as u32;
        settings.connection.reconnection_attempts = attempts;
    }
    if let Some(v) = env.u64("ORDERCAST_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        settings.heartbeat.interval_ms = v;
    }
    if let Some(v) = env.u64("ORDERCAST_HEARTBEAT_TIMEOUT_MS", 1000, 1_800_000) {
        settings.heartbeat.timeout_ms = v;
    }
    if let Some(v) = env.u64("ORDERCAST_PROBE_GRACE_MS", 100, 120_000) {
        settings.heartbeat.probe_grace_ms = v;
    }
    if let Some(v) = env.string("ORDERCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ORDERCAST_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"heartbeat": {"intervalMs": 30000, "timeoutMs": 45000}});
        let source = serde_json::json!({"heartbeat": {"intervalMs": 10000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["heartbeat"]["intervalMs"], 10000);
        assert_eq!(merged["heartbeat"]["timeoutMs"], 45000);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"transports": ["websocket", "polling"]});
        let source = serde_json::json!({"transports": ["websocket"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["transports"], serde_json::json!(["websocket"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.pipeline.pending_capacity, 100);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"url": "wss://rt.example.com", "platform": "kiosk"},
                "heartbeat": {"intervalMs": 20000, "timeoutMs": 30000}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.url, "wss://rt.example.com");
        assert_eq!(settings.server.platform, "kiosk");
        assert_eq!(settings.server.namespace, "/");
        assert_eq!(settings.heartbeat.interval_ms, 20_000);
        assert_eq!(settings.heartbeat.probe_grace_ms, 5000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn inconsistent_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"heartbeat": {"intervalMs": 60000}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ORDERCAST_SERVER_URL", "wss://prod.example.com"),
                ("ORDERCAST_HEARTBEAT_INTERVAL_MS", "15000"),
                ("ORDERCAST_RECONNECTION_ATTEMPTS", "12"),
                ("ORDERCAST_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.url, "wss://prod.example.com");
        assert_eq!(settings.heartbeat.interval_ms, 15_000);
        assert_eq!(settings.connection.reconnection_attempts, 12);
        assert!(settings.logging.json);
    }

    #[test]
    fn out_of_range_env_ignored() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ORDERCAST_HEARTBEAT_INTERVAL_MS", "5"),
                ("ORDERCAST_CONNECT_TIMEOUT_MS", "abc"),
                ("ORDERCAST_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(settings.heartbeat.interval_ms, 30_000);
        assert_eq!(settings.connection.connect_timeout_ms, 30_000);
        assert!(!settings.logging.json);
    }

    #[test]
    fn empty_env_string_ignored() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(&mut settings, env(&[("ORDERCAST_PLATFORM", "")]));
        assert_eq!(settings.server.platform, "pos");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("1000", 1000, 2000), Some(1000));
        assert_eq!(parse_u64_range(" 2000 ", 1000, 2000), Some(2000));
        assert_eq!(parse_u64_range("2001", 1000, 2000), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
