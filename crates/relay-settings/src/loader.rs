//! Settings loading: defaults, then file (deep merge), then environment.
//!
//! Merge rules:
//! - Objects merge recursively, source keys winning
//! - Arrays and primitives are replaced wholesale
//! - `null` in the source keeps the target value

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// Directory under `$HOME` holding relay state.
const SETTINGS_DIR: &str = ".mission-relay";

/// Default settings file (`~/.mission-relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(SETTINGS_DIR).join("settings.json")
}

/// Load from the default path.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`, apply environment overrides and validate.
///
/// A missing file yields defaults; unreadable or malformed JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (target, Value::Null) => target,
        (_, source) => source,
    }
}

/// Apply `RELAY_*` environment variables.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and skipped.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("RELAY_PORT").and_then(|v| checked("RELAY_PORT", &v, parse_u16_range(&v, 0, u16::MAX))) {
        settings.server.port = v;
    }
    if let Some(v) = read("RELAY_MAX_CONNECTIONS")
        .and_then(|v| checked("RELAY_MAX_CONNECTIONS", &v, parse_usize_range(&v, 1, 1_000_000)))
    {
        settings.server.max_connections = v;
    }
    if let Some(v) = read("RELAY_HEARTBEAT_INTERVAL")
        .and_then(|v| checked("RELAY_HEARTBEAT_INTERVAL", &v, parse_u64_range(&v, 1, 3600)))
    {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read("RELAY_HEARTBEAT_TIMEOUT")
        .and_then(|v| checked("RELAY_HEARTBEAT_TIMEOUT", &v, parse_u64_range(&v, 1, 7200)))
    {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("RELAY_LOG_JSON").and_then(|v| checked("RELAY_LOG_JSON", &v, parse_bool(&v))) {
        settings.logging.json = v;
    }
}

fn checked<T>(key: &str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key, value = raw, "invalid env override, ignoring");
    }
    parsed
}

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitively.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` in `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim().parse().ok().filter(|n| (min..=max).contains(n))
}

/// Parse a `u64` in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim().parse().ok().filter(|n| (min..=max).contains(n))
}

/// Parse a `usize` in `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.trim().parse().ok().filter(|n| (min..=max).contains(n))
}
