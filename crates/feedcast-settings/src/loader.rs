//! Layered settings for the `feedcast` binary.
//!
//! Precedence, lowest first:
//! 1. [`FeedcastSettings::default()`]
//! 2. A JSON file, merged key by key over the defaults. An explicit
//!    `--config` path must exist; the fallback `~/.feedcast/settings.json`
//!    may be absent. A `null` in the file keeps the default.
//! 3. `FEEDCAST_*` variables. The bus address also accepts `NATS_ADDRESS`,
//!    the variable the original pusher deployment set, when
//!    `FEEDCAST_BUS_ADDRESS` is unset.
//!
//! Command-line flags are applied by the binary on top of the result, which
//! is then validated again.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::FeedcastSettings;

/// Resolve the default settings file (`~/.feedcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".feedcast").join("settings.json")
}

/// Load settings from `path` (or the default path), apply env overrides,
/// and validate the result.
///
/// An explicit `path` that does not exist is an error; the default path is
/// optional.
pub fn load_settings(path: Option<&Path>) -> Result<FeedcastSettings> {
    let settings = match path {
        Some(path) => {
            if !path.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
                .into());
            }
            load_settings_from_path(path)?
        }
        None => load_settings_from_path(&settings_path())?,
    };
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FeedcastSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<FeedcastSettings> {
    let defaults = serde_json::to_value(FeedcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Merge `source` into `target`: objects recurse per key, anything else in
/// `source` replaces `target`, and `null` leaves `target` untouched.
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

/// Apply `FEEDCAST_*` environment variable overrides.
///
/// Invalid values are ignored with a warning (the file/default value stays).
pub fn apply_env_overrides(settings: &mut FeedcastSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// `FEEDCAST_BUS_ADDRESS` wins over the legacy `NATS_ADDRESS`.
pub fn apply_overrides<F>(settings: &mut FeedcastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader(lookup);

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("FEEDCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("FEEDCAST_PORT", 1..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.number("FEEDCAST_QUEUE_CAPACITY", 1..=1_000_000) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = env.number("FEEDCAST_SHUTDOWN_TIMEOUT_MS", 0..=600_000) {
        settings.server.shutdown_timeout_ms = v;
    }

    // ── Bus ─────────────────────────────────────────────────────────
    if let Some(v) = env
        .string("FEEDCAST_BUS_ADDRESS")
        .or_else(|| env.string("NATS_ADDRESS"))
    {
        settings.bus.address = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("FEEDCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("FEEDCAST_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Typed reads over an env lookup; unparsable values warn and yield `None`.
struct EnvReader<F>(F);

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn number<T>(&self, name: &str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd,
    {
        self.parsed(name, "number", |v| parse_in_range(v, &range))
    }
}

/// Parse an on/off flag: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// in any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only if it falls inside `range`.
pub fn parse_in_range<T>(val: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8082, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
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

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = merge_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, FeedcastSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "bus": {"address": "memory://"}}"#,
        )
        .unwrap();

        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.bus.address, "memory://");
        assert_eq!(settings.bus.created_feed_topic, "created_feed");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(merge_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "high"}}"#).unwrap();
        assert_matches!(merge_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert_matches!(load_settings(Some(&path)), Err(SettingsError::Io(_)));
    }

    #[test]
    fn explicit_invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"outboundQueueCapacity": 0}}"#).unwrap();
        assert_matches!(
            load_settings(Some(&path)),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = FeedcastSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("FEEDCAST_HOST", "127.0.0.1"),
                ("FEEDCAST_PORT", "9001"),
                ("FEEDCAST_QUEUE_CAPACITY", "8"),
                ("FEEDCAST_SHUTDOWN_TIMEOUT_MS", "250"),
                ("FEEDCAST_LOG_LEVEL", "debug"),
                ("FEEDCAST_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.server.outbound_queue_capacity, 8);
        assert_eq!(settings.server.shutdown_timeout_ms, 250);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = FeedcastSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("FEEDCAST_PORT", "0"),
                ("FEEDCAST_QUEUE_CAPACITY", "lots"),
                ("FEEDCAST_LOG_JSON", "maybe"),
                ("FEEDCAST_HOST", ""),
            ]),
        );
        assert_eq!(settings, FeedcastSettings::default());
    }

    #[test]
    fn nats_address_is_fallback() {
        let mut settings = FeedcastSettings::default();
        apply_overrides(&mut settings, env(&[("NATS_ADDRESS", "broker:4222")]));
        assert_eq!(settings.bus.address, "broker:4222");

        let mut settings = FeedcastSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("NATS_ADDRESS", "broker:4222"),
                ("FEEDCAST_BUS_ADDRESS", "memory://"),
            ]),
        );
        assert_eq!(settings.bus.address, "memory://");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_values() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_in_range("8082", &(1..=u16::MAX)), Some(8082));
        assert_eq!(parse_in_range("0", &(1..=u16::MAX)), None);
        assert_eq!(parse_in_range::<u16>("70000", &(1..=u16::MAX)), None);
        assert_eq!(parse_in_range("5000", &(0..=600_000u64)), Some(5000));
        assert_eq!(parse_in_range::<u64>("-1", &(0..=10)), None);
        assert_eq!(parse_in_range("256", &(1..=1_000_000usize)), Some(256));
        assert_eq!(parse_in_range::<usize>("", &(1..=10)), None);
    }
}
