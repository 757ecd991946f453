use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use tutor_core::context::LlmContext;
use tutor_core::errors::GatewayError;
use tutor_core::provider::{AgentRole, LlmProvider, ModelSource, StreamEventStream, StreamOptions};
use tutor_core::stream::StreamEvent;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Yield text tokens one at a time, sleeping `interval` before each.
    Paced { interval: Duration, tokens: Vec<String> },
    /// Return an error from the call itself.
    Error(GatewayError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Never resolve. For cancellation tests.
    Hang,
}

impl MockResponse {
    /// A stream of the given tokens followed by `Done`.
    pub fn tokens(tokens: &[&str]) -> Self {
        let mut events = vec![StreamEvent::Start];
        events.extend(tokens.iter().map(|t| StreamEvent::TextDelta { delta: t.to_string() }));
        events.push(StreamEvent::Done {
            finish_reason: Some("stop".into()),
        });
        Self::Stream(events)
    }

    /// A whole answer delivered as one token.
    pub fn text(text: &str) -> Self {
        Self::tokens(&[text])
    }

    /// Some tokens, then a mid-stream error.
    pub fn tokens_then_error(tokens: &[&str], error: GatewayError) -> Self {
        let mut events = vec![StreamEvent::Start];
        events.extend(tokens.iter().map(|t| StreamEvent::TextDelta { delta: t.to_string() }));
        events.push(StreamEvent::Error { error });
        Self::Stream(events)
    }

    pub fn paced(interval: Duration, tokens: &[&str]) -> Self {
        Self::Paced {
            interval,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in call order.
pub struct MockProvider {
    model: String,
    responses: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self::named("mock-model", responses)
    }

    pub fn named(model: &str, responses: Vec<MockResponse>) -> Self {
        Self {
            model: model.to_string(),
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// User-turn text of every call so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, context: &LlmContext, _options: &StreamOptions) -> Result<StreamEventStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().push(context.user_text());

        let response = self.responses.lock().pop_front().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("MockProvider: no response configured for call {idx}"))
        })?;
        resolve_response(response).await
    }
}

/// Resolve a MockResponse, unrolling nested delays iteratively.
async fn resolve_response(response: MockResponse) -> Result<StreamEventStream, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
            MockResponse::Paced { interval, tokens } => {
                let deltas = stream::iter(tokens).then(move |delta| async move {
                    tokio::time::sleep(interval).await;
                    StreamEvent::TextDelta { delta }
                });
                let done = stream::iter([StreamEvent::Done {
                    finish_reason: Some("stop".into()),
                }]);
                return Ok(Box::pin(stream::iter([StreamEvent::Start]).chain(deltas).chain(done)));
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockResponse::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved");
            }
        }
    }
}

/// A [`ModelSource`] backed by one mock per role.
#[derive(Default)]
pub struct MockModels {
    providers: HashMap<AgentRole, Arc<MockProvider>>,
    failures: HashMap<AgentRole, GatewayError>,
}

impl MockModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: AgentRole, responses: Vec<MockResponse>) -> Self {
        self.providers
            .insert(role, Arc::new(MockProvider::named(&format!("mock-{role}"), responses)));
        self
    }

    /// Make resolving the client for `role` fail, as for an unknown model name.
    pub fn failing(mut self, role: AgentRole, error: GatewayError) -> Self {
        self.failures.insert(role, error);
        self
    }

    pub fn provider(&self, role: AgentRole) -> Option<Arc<MockProvider>> {
        self.providers.get(&role).cloned()
    }
}

impl ModelSource for MockModels {
    fn model_for(&self, role: AgentRole) -> Result<Arc<dyn LlmProvider>, GatewayError> {
        if let Some(e) = self.failures.get(&role) {
            return Err(e.clone());
        }
        self.providers
            .get(&role)
            .map(|p| Arc::clone(p) as Arc<dyn LlmProvider>)
            .ok_or_else(|| GatewayError::UnsupportedModel(format!("no mock configured for {role}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(stream: StreamEventStream) -> Vec<StreamEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn token_response() {
        let mock = MockProvider::new(vec![MockResponse::tokens(&["A", "B"])]);
        let events = drain(mock.stream(&LlmContext::from_prompt("p"), &StreamOptions::default()).await.unwrap()).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].text(), Some("A"));
        assert!(matches!(events[3], StreamEvent::Done { .. }));
        assert_eq!(mock.prompts(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("only one")]);
        let ctx = LlmContext::empty();
        assert!(mock.stream(&ctx, &StreamOptions::default()).await.is_ok());
        assert!(mock.stream(&ctx, &StreamOptions::default()).await.is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_error() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(3),
            MockResponse::Error(GatewayError::RateLimited { retry_after: None }),
        )]);
        let start = tokio::time::Instant::now();
        let result = mock.stream(&LlmContext::empty(), &StreamOptions::default()).await;
        assert!(matches!(result, Err(GatewayError::RateLimited { .. })));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn paced_tokens_arrive_over_time() {
        let mock = MockProvider::new(vec![MockResponse::paced(Duration::from_secs(2), &["x", "y"])]);
        let start = tokio::time::Instant::now();
        let events = drain(mock.stream(&LlmContext::empty(), &StreamOptions::default()).await.unwrap()).await;
        let text: String = events.iter().filter_map(|e| e.text()).collect();
        assert_eq!(text, "xy");
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[test]
    fn mock_models_resolution() {
        let models = MockModels::new()
            .with(AgentRole::Reading, vec![])
            .failing(AgentRole::Grammar, GatewayError::UnsupportedModel("Unknown model: x".into()));
        assert_eq!(models.model_for(AgentRole::Reading).unwrap().model(), "mock-reading");
        assert!(models.model_for(AgentRole::Grammar).is_err());
        assert!(models.model_for(AgentRole::Vocabulary).is_err());
    }
}
