use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::context::LlmContext;
use crate::errors::GatewayError;
use crate::stream::StreamEvent;

pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Options controlling generation for one call.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl StreamOptions {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }
}

/// A chat model reachable over some transport.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Token-streaming call.
    async fn stream(&self, context: &LlmContext, options: &StreamOptions) -> Result<StreamEventStream, GatewayError>;

    /// Single-shot call returning the full answer.
    ///
    /// The default drains [`LlmProvider::stream`]; transports with a cheaper
    /// non-streaming endpoint override it.
    async fn complete(&self, context: &LlmContext, options: &StreamOptions) -> Result<String, GatewayError> {
        let mut stream = self.stream(context, options).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta { delta } => text.push_str(&delta),
                StreamEvent::Error { error } => return Err(error),
                StreamEvent::Done { .. } => break,
                StreamEvent::Start | StreamEvent::ToolCallDelta { .. } => {}
            }
        }
        Ok(text)
    }
}

/// Which job a model call serves. Each role maps to its own configured model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Supervisor,
    Reading,
    Grammar,
    Vocabulary,
    Ocr,
    Chat,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Reading => "reading",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
            Self::Ocr => "ocr",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the client configured for a role.
///
/// Resolution may fail for unknown or unsupported model names; callers
/// treat that as a failure of the agent that asked, not of the request.
pub trait ModelSource: Send + Sync {
    fn model_for(&self, role: AgentRole) -> Result<Arc<dyn LlmProvider>, GatewayError>;
}
