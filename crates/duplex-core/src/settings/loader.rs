//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::errors::Result;
use super::types::{DuplexSettings, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

/// Resolve the path to the settings file (`~/.duplex/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".duplex").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DuplexSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; malformed JSON or an unusable value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DuplexSettings> {
    let defaults = serde_json::to_value(DuplexSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: DuplexSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
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

/// Apply `DUPLEX_*` environment variable overrides.
///
/// Out-of-range or unparsable values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut DuplexSettings) {
    if let Some(v) = read_env_string("DUPLEX_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("DUPLEX_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("DUPLEX_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_u64("DUPLEX_SEND_TIMEOUT_MS", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS) {
        settings.connection.send_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("DUPLEX_CLOSE_TIMEOUT_MS", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS) {
        settings.connection.close_recv_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("DUPLEX_HANDSHAKE_TIMEOUT_MS", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS) {
        settings.connection.handshake_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("DUPLEX_QUEUE_CAPACITY", 1, 65_536) {
        settings.connection.outbound_capacity = v;
        settings.connection.inbound_capacity = v;
    }
    if let Some(v) = read_env_string("DUPLEX_LOG") {
        settings.log_level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
