//! Settings sections.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, SettingsError};

/// Top-level settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TutorSettings {
    /// Deployment label (`development`, `production`, ...).
    pub environment: String,
    pub server: ServerSettings,
    pub models: ModelSettings,
    pub retry: RetrySettings,
    pub streaming: StreamingSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
    /// Provider credentials. Only ever read from the environment.
    #[serde(skip)]
    pub keys: ApiKeys,
}

#[derive(Clone, Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub glm: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. `*` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Model names and generation budgets per agent role.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub supervisor: String,
    pub reading: String,
    pub grammar: String,
    pub vocabulary: String,
    pub ocr: String,
    pub chat: String,
    /// Vision detail hint: `low`, `high` or `auto`.
    pub ocr_detail: String,
    pub ocr_max_tokens: u32,
    pub default_max_tokens: u32,
    pub supervisor_max_tokens: u32,
    pub vocabulary_max_tokens: u32,
    pub request_timeout_secs: u64,
    pub supervisor_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let model = "gpt-4o-mini".to_string();
        Self {
            supervisor: model.clone(),
            reading: model.clone(),
            grammar: model.clone(),
            vocabulary: model.clone(),
            ocr: model.clone(),
            chat: model,
            ocr_detail: "low".to_string(),
            ocr_max_tokens: 2048,
            default_max_tokens: 4096,
            supervisor_max_tokens: 1024,
            vocabulary_max_tokens: 6144,
            request_timeout_secs: 120,
            supervisor_timeout_secs: 30,
        }
    }
}

impl ModelSettings {
    pub fn all_names(&self) -> [&str; 6] {
        [&self.supervisor, &self.reading, &self.grammar, &self.vocabulary, &self.ocr, &self.chat]
    }
}

/// Model-call retry policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSettings {
    /// Idle interval after which a keep-alive is sent.
    pub heartbeat_interval_ms: u64,
    /// Run the pre-analysis model call before the section agents.
    pub pre_analysis: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            pre_analysis: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub ttl_hours: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

const MIN_HEARTBEAT_MS: u64 = 100;
const OCR_DETAILS: [&str; 3] = ["low", "high", "auto"];

impl TutorSettings {
    /// Clamp out-of-range values and check that required credentials exist.
    pub fn validate(&mut self) -> Result<()> {
        if self.streaming.heartbeat_interval_ms < MIN_HEARTBEAT_MS {
            warn!(
                value = self.streaming.heartbeat_interval_ms,
                min = MIN_HEARTBEAT_MS,
                "heartbeat interval too small, clamping"
            );
            self.streaming.heartbeat_interval_ms = MIN_HEARTBEAT_MS;
        }
        if self.session.ttl_hours == 0 {
            warn!("session ttl of 0 hours, using 1");
            self.session.ttl_hours = 1;
        }
        if !OCR_DETAILS.contains(&self.models.ocr_detail.as_str()) {
            warn!(value = %self.models.ocr_detail, "unknown ocr detail, using low");
            self.models.ocr_detail = "low".to_string();
        }
        if self.models.request_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue("models.requestTimeoutSecs must be positive".into()));
        }

        let needs_openai = self.models.all_names().iter().any(|m| !m.starts_with("glm-"));
        if needs_openai && self.keys.openai.is_none() {
            return Err(SettingsError::Missing("OPENAI_API_KEY"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
