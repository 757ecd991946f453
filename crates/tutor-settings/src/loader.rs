//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TutorSettings;

/// Build settings from defaults, an optional JSON file, and `env`.
///
/// `env` is the variable lookup (normally `|k| std::env::var(k).ok()`).
/// A missing file is not an error; invalid JSON is.
pub fn load_settings_from<F>(path: Option<&Path>, env: F) -> Result<TutorSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(TutorSettings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: TutorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

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

/// Apply environment overrides. Unparseable numbers are ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut TutorSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    // ── Credentials ─────────────────────────────────────────────────
    if let Some(v) = string("OPENAI_API_KEY") {
        settings.keys.openai = Some(SecretString::from(v));
    }
    if let Some(v) = string("GLM_API_KEY") {
        settings.keys.glm = Some(SecretString::from(v));
    }

    // ── Deployment ──────────────────────────────────────────────────
    if let Some(v) = string("ENVIRONMENT") {
        settings.environment = v;
    }
    if let Some(v) = string("LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }

    // ── Models ──────────────────────────────────────────────────────
    let models = &mut settings.models;
    for (name, slot) in [
        ("SUPERVISOR_MODEL", &mut models.supervisor),
        ("READING_MODEL", &mut models.reading),
        ("GRAMMAR_MODEL", &mut models.grammar),
        ("VOCABULARY_MODEL", &mut models.vocabulary),
        ("OCR_MODEL", &mut models.ocr),
        ("CHAT_MODEL", &mut models.chat),
        ("OCR_DETAIL", &mut models.ocr_detail),
    ] {
        if let Some(v) = string(name) {
            *slot = v;
        }
    }
    if let Some(v) = read_number(&string, "OCR_MAX_TOKENS", 1, 128_000) {
        models.ocr_max_tokens = v as u32;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_number(&string, "PORT", 1, u64::from(u16::MAX)) {
        settings.server.port = v as u16;
    }
    if let Some(v) = string("CORS_ORIGINS") {
        settings.server.cors_origins = parse_list(&v);
    }

    // ── Sessions & streaming ────────────────────────────────────────
    if let Some(v) = read_number(&string, "SESSION_TTL_HOURS", 1, 24 * 365) {
        settings.session.ttl_hours = v;
    }
    if let Some(v) = read_number(&string, "HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.streaming.heartbeat_interval_ms = v;
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_number(lookup: &impl Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}
