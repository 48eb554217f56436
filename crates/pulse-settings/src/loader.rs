//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PulseSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PULSE_*` environment overrides
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::PulseSettings;

/// Resolve the default settings file path (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<PulseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<PulseSettings> {
    let defaults = serde_json::to_value(PulseSettings::default())?;

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

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut PulseSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, leaving the file/default value in place.
pub fn apply_overrides_from<F>(settings: &mut PulseSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64("PULSE_PORT", 0, 65_535) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.usize("PULSE_SEND_BUFFER", 1, 65_536) {
        settings.server.send_buffer = v;
    }
    if let Some(v) = env.usize("PULSE_MAX_MESSAGE_SIZE", 64, 1 << 20) {
        settings.server.max_message_size = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.usize("PULSE_HISTORY_WINDOW", 5, 50) {
        settings.session.history_window = v;
    }
    if let Some(v) = env.usize("PULSE_RECENT_ACTIONS", 1, 50) {
        settings.session.recent_actions = v;
    }
    if let Some(v) = env.u64("PULSE_INACTIVITY_TIMEOUT_MS", 1_000, 86_400_000) {
        settings.session.inactivity_timeout_ms = v;
    }
    if let Some(v) = env.u64("PULSE_CLEANUP_INTERVAL_MS", 1_000, 86_400_000) {
        settings.session.cleanup_interval_ms = v;
    }

    // ── Validation ──────────────────────────────────────────────────
    if let Some(v) = env.u32("PULSE_STAGE_MAX", 1, u32::MAX) {
        settings.validation.stage_max = v;
    }
    if let Some(v) = env.u32("PULSE_CLICKS_MAX", 1, u32::MAX) {
        settings.validation.clicks_max = v;
    }

    // ── Analysis ────────────────────────────────────────────────────
    if let Some(v) = env.u64("PULSE_ANALYSIS_INTERVAL_MS", 1_000, 60_000) {
        settings.analysis.interval_ms = v;
    }
    if let Some(v) = env.usize("PULSE_ANALYSIS_MAX_IN_FLIGHT", 1, 256) {
        settings.analysis.max_in_flight = v;
    }

    // ── LLM ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_LLM_BASE_URL") {
        settings.llm.base_url = v;
    }
    if let Some(v) = env.string("PULSE_LLM_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = env
        .string("PULSE_LLM_API_KEY")
        .or_else(|| env.string("DEEPSEEK_API_KEY"))
    {
        settings.llm.api_key = Some(v);
    }
    if let Some(v) = env.u32("PULSE_LLM_MAX_TOKENS", 1, 4096) {
        settings.llm.max_tokens = v;
    }
    if let Some(v) = env.f64("PULSE_LLM_TEMPERATURE", 0.0, 2.0) {
        settings.llm.temperature = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("PULSE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a boolean. Accepts `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer within an inclusive range.
pub fn parse_int_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a finite float within an inclusive range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
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

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, "u32", |v| parse_int_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_int_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_int_range(v, min, max))
    }

    fn f64(&self, name: &str, min: f64, max: f64) -> Option<f64> {
        self.parsed(name, "f64", |v| parse_f64_range(v, min, max))
    }
}
