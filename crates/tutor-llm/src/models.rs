use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use tutor_core::errors::GatewayError;
use tutor_core::provider::{AgentRole, LlmProvider, ModelSource};
use tutor_core::security::{env_vars, ApiKey};
use tutor_settings::TutorSettings;

use crate::provider::OpenAiProvider;
use crate::reliable::{ReliableConfig, ReliableProvider};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend families reachable through the chat-completions API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Glm,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Glm => "glm",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Glm => "https://open.bigmodel.cn/api/paas/v4",
        }
    }

    pub fn key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => env_vars::OPENAI_API_KEY,
            Self::Glm => env_vars::GLM_API_KEY,
        }
    }
}

/// Map a model name to the backend that serves it.
pub fn provider_for_model(model: &str) -> Result<ProviderKind, GatewayError> {
    if model.starts_with("claude-") {
        Err(GatewayError::UnsupportedModel(format!(
            "{model}: Anthropic models are not supported, use a gpt-* or glm-* model"
        )))
    } else if model.starts_with("gpt-") {
        Ok(ProviderKind::OpenAi)
    } else if model.starts_with("glm-") {
        Ok(ProviderKind::Glm)
    } else {
        Err(GatewayError::UnsupportedModel(format!("Unknown model: {model}")))
    }
}

/// Model name and generation budget for one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Builds model clients from settings. Owns the shared HTTP client.
pub struct ModelRegistry {
    client: Client,
    openai_key: Option<ApiKey>,
    glm_key: Option<ApiKey>,
    specs: HashMap<AgentRole, ModelSpec>,
    retry: ReliableConfig,
}

impl ModelRegistry {
    pub fn from_settings(settings: &TutorSettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        let m = &settings.models;
        let timeout = Duration::from_secs(m.request_timeout_secs);
        let spec = |model: &str, max_tokens: u32, timeout: Duration| ModelSpec {
            model: model.to_string(),
            max_tokens,
            timeout,
        };
        let specs = HashMap::from([
            (
                AgentRole::Supervisor,
                spec(&m.supervisor, m.supervisor_max_tokens, Duration::from_secs(m.supervisor_timeout_secs)),
            ),
            (AgentRole::Reading, spec(&m.reading, m.default_max_tokens, timeout)),
            (AgentRole::Grammar, spec(&m.grammar, m.default_max_tokens, timeout)),
            (AgentRole::Vocabulary, spec(&m.vocabulary, m.vocabulary_max_tokens, timeout)),
            (AgentRole::Ocr, spec(&m.ocr, m.ocr_max_tokens, timeout)),
            (AgentRole::Chat, spec(&m.chat, m.default_max_tokens, timeout)),
        ]);

        Ok(Self {
            client,
            openai_key: settings.keys.openai.clone().map(ApiKey::from),
            glm_key: settings.keys.glm.clone().map(ApiKey::from),
            specs,
            retry: ReliableConfig::from(&settings.retry),
        })
    }

    pub fn spec(&self, role: AgentRole) -> Option<&ModelSpec> {
        self.specs.get(&role)
    }

    /// Build a retrying client for `model`.
    ///
    /// Fails for unsupported model families and for missing credentials.
    pub fn get_model_client(
        &self,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Arc<dyn LlmProvider>, GatewayError> {
        let kind = provider_for_model(model)?;
        let key = match kind {
            ProviderKind::OpenAi => self.openai_key.clone(),
            ProviderKind::Glm => self.glm_key.clone(),
        }
        .ok_or(GatewayError::MissingCredential(kind.key_var()))?;

        debug!(model, provider = kind.name(), max_tokens, "building model client");
        let provider = OpenAiProvider::new(self.client.clone(), kind, key, model, max_tokens, timeout);
        Ok(Arc::new(ReliableProvider::new(provider, self.retry.clone())))
    }
}

impl ModelSource for ModelRegistry {
    fn model_for(&self, role: AgentRole) -> Result<Arc<dyn LlmProvider>, GatewayError> {
        let spec = self
            .spec(role)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("no model configured for role {role}")))?;
        self.get_model_client(&spec.model, spec.max_tokens, spec.timeout)
    }
}
