use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use tutor_core::analysis::PreAnalysis;
use tutor_core::context::LlmContext;
use tutor_core::provider::{AgentRole, ModelSource, StreamOptions};
use tutor_core::stream::StreamEvent;
use tutor_core::task::Level;

use crate::channel::TokenSender;
use crate::error::EngineError;

/// What every analysis agent receives. Shared read-only across the fan-out.
#[derive(Clone, Debug)]
pub struct AgentInput {
    pub text: String,
    pub level: Level,
    pub pre_analysis: Option<PreAnalysis>,
}

/// Result of one producer run. Failures are values; only cancellation is an `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentOutcome<T> {
    Completed(T),
    Failed { message: String },
}

impl<T> AgentOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { message } => Some(message),
        }
    }
}

/// One token-streaming analysis agent.
pub trait TokenAgent: Send + Sync + 'static {
    type Output: Send + 'static;

    fn role(&self) -> AgentRole;

    /// Build the model request. An error here is an agent-local failure.
    fn context(&self, input: &AgentInput) -> Result<LlmContext, EngineError>;

    /// Turn the accumulated raw text into the agent's result. Must not panic.
    fn finish(&self, raw: String) -> Self::Output;
}

/// Run one agent to completion.
///
/// Every text token is pushed to `sink` as soon as it arrives, before any
/// transformation. The sink is closed exactly once on every path: after the
/// last token on success, as soon as the failure is caught otherwise, and by
/// drop if this future is itself dropped.
#[instrument(skip_all, fields(role = %agent.role()))]
pub async fn run_producer<A: TokenAgent>(
    agent: Arc<A>,
    models: Arc<dyn ModelSource>,
    input: Arc<AgentInput>,
    sink: Option<TokenSender>,
    cancel: CancellationToken,
) -> Result<AgentOutcome<A::Output>, EngineError> {
    let mut sink = sink;

    let streamed = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        result = stream_tokens(&*agent, &*models, &input, sink.as_ref()) => result,
    };
    if let Some(sink) = sink.take() {
        sink.close();
    }

    match streamed {
        Ok(raw) => {
            debug!(chars = raw.len(), "agent finished");
            Ok(AgentOutcome::Completed(agent.finish(raw)))
        }
        Err(e) if e.is_cancelled() => Err(EngineError::Cancelled),
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "agent failed");
            Ok(AgentOutcome::Failed { message: e.to_string() })
        }
    }
}

async fn stream_tokens<A: TokenAgent>(
    agent: &A,
    models: &dyn ModelSource,
    input: &AgentInput,
    sink: Option<&TokenSender>,
) -> Result<String, EngineError> {
    let client = models.model_for(agent.role())?;
    let context = agent.context(input)?;
    let mut stream = client.stream(&context, &StreamOptions::default()).await?;

    let mut accumulated = String::new();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::TextDelta { delta } if !delta.is_empty() => {
                if let Some(sink) = sink {
                    let _ = sink.send(delta.as_str());
                }
                accumulated.push_str(&delta);
            }
            StreamEvent::Error { error } => return Err(error.into()),
            StreamEvent::Done { .. } => break,
            StreamEvent::Start | StreamEvent::TextDelta { .. } | StreamEvent::ToolCallDelta { .. } => {}
        }
    }
    Ok(accumulated)
}
