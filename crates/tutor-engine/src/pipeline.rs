//! Request lifecycle: routing, pre-analysis, fan-out, draining, resolution.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::{stream, try_stream};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use tutor_core::analysis::{AnalyzeResponse, PreAnalysis};
use tutor_core::events::{Section, TutorEvent};
use tutor_core::ids::SessionId;
use tutor_core::messages::{ImageDetail, Role};
use tutor_core::provider::ModelSource;
use tutor_core::task::{ImagePayload, Level, TaskRequest};
use tutor_settings::TutorSettings;
use tutor_store::SessionStore;

use crate::agents::{GrammarAgent, ReadingAgent, VocabularyAgent};
use crate::aggregator::{aggregate, AgentOutcomes};
use crate::channel::{token_channel, TokenSender};
use crate::chat;
use crate::error::EngineError;
use crate::heartbeat::{Beat, HeartbeatStream};
use crate::multiplexer::{Multiplexer, MuxItem};
use crate::ocr;
use crate::producer::{run_producer, AgentInput, AgentOutcome, TokenAgent};
use crate::supervisor::{fallback_pre_analysis, run_pre_analysis};

/// Wire events for one request, in emission order.
pub type EventStream = Pin<Box<dyn Stream<Item = TutorEvent> + Send>>;

type Fallible = Pin<Box<dyn Stream<Item = Result<TutorEvent, EngineError>> + Send>>;

type AgentHandle<T> = AbortOnDropHandle<Result<AgentOutcome<T>, EngineError>>;

/// Knobs the pipeline reads, fixed at startup.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub heartbeat_interval: Duration,
    pub pre_analysis: bool,
    pub ocr_detail: ImageDetail,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            pre_analysis: true,
            ocr_detail: ImageDetail::Low,
        }
    }
}

impl From<&TutorSettings> for PipelineConfig {
    fn from(settings: &TutorSettings) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(settings.streaming.heartbeat_interval_ms),
            pre_analysis: settings.streaming.pre_analysis,
            ocr_detail: ImageDetail::parse(&settings.models.ocr_detail).unwrap_or_default(),
        }
    }
}

pub struct Pipeline {
    models: Arc<dyn ModelSource>,
    sessions: Arc<SessionStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(models: Arc<dyn ModelSource>, sessions: Arc<SessionStore>, config: PipelineConfig) -> Self {
        Self {
            models,
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request as a stream of wire events.
    ///
    /// The stream ends after a single `Done` or `Error` event. Dropping it
    /// cancels `cancel` and aborts every task the request spawned; a
    /// cancelled request ends without an error event.
    pub fn run(self: &Arc<Self>, request: TaskRequest, cancel: CancellationToken) -> EventStream {
        let kind = request.kind();
        let level = request.level();
        let mut inner = Arc::clone(self).events(request, cancel.clone());

        Box::pin(stream! {
            let _guard = cancel.drop_guard();
            info!(kind = kind.as_str(), level = %level, "request started");
            while let Some(item) = inner.next().await {
                match item {
                    Ok(event) => {
                        yield event;
                    }
                    Err(e) if e.is_cancelled() => {
                        debug!(kind = kind.as_str(), "request cancelled");
                        break;
                    }
                    Err(e) => {
                        error!(kind = kind.as_str(), error = %e, error_kind = e.kind(), code = e.code(), "request failed");
                        yield TutorEvent::Error {
                            message: e.to_string(),
                            code: e.code().to_string(),
                        };
                        break;
                    }
                }
            }
        })
    }

    fn events(self: Arc<Self>, request: TaskRequest, cancel: CancellationToken) -> Fallible {
        Box::pin(try_stream! {
            match request {
                TaskRequest::Analyze { text, level } => {
                    let session_id = self.sessions.create();
                    self.sessions.add_message(&session_id, Role::User, text.as_str());
                    let mut analysis = Arc::clone(&self).analyze(session_id, text, level, cancel);
                    while let Some(event) = analysis.next().await {
                        yield event?;
                    }
                }
                TaskRequest::ImageProcess { image, level } => {
                    let mut phase = self.ocr_phase(image, &cancel);
                    let mut extracted = None;
                    while let Some(beat) = phase.next().await {
                        match beat {
                            Beat::Event(result) => extracted = Some(result),
                            Beat::Idle => {
                                yield TutorEvent::Heartbeat;
                            }
                        }
                    }
                    phase.shutdown().await;
                    cancelled(&cancel)?;

                    let text = extracted
                        .unwrap_or_else(|| Err(EngineError::ImageProcessing("OCR produced no result".into())))?;
                    let session_id = self.sessions.create();
                    if text.is_empty() {
                        info!(session_id = %session_id, "no text found in image");
                        yield TutorEvent::Done { session_id };
                    } else {
                        self.sessions.add_message(&session_id, Role::User, text.as_str());
                        let mut analysis = Arc::clone(&self).analyze(session_id, text, level, cancel);
                        while let Some(event) = analysis.next().await {
                            yield event?;
                        }
                    }
                }
                TaskRequest::Chat { session_id, question, level } => {
                    let session_id = self.sessions.get_or_create(session_id.as_ref());
                    let mut phase = self.chat_phase(session_id.clone(), question, level, &cancel);
                    let mut answer = None;
                    while let Some(beat) = phase.next().await {
                        match beat {
                            Beat::Event(result) => answer = Some(result),
                            Beat::Idle => {
                                yield TutorEvent::Heartbeat;
                            }
                        }
                    }
                    phase.shutdown().await;
                    cancelled(&cancel)?;

                    let content = answer.unwrap_or_else(|| Err(EngineError::Internal("chat produced no answer".into())))?;
                    yield TutorEvent::ChatChunk { content };
                    yield TutorEvent::Done { session_id };
                }
            }
        })
    }

    /// Pre-analysis, then the three streamed agents, then per-section results and `Done`.
    fn analyze(self: Arc<Self>, session_id: SessionId, text: String, level: Level, cancel: CancellationToken) -> Fallible {
        Box::pin(try_stream! {
            let pre_analysis = if self.config.pre_analysis {
                let mut phase = self.pre_analysis_phase(text.clone(), level, &cancel);
                let mut outcome = None;
                while let Some(beat) = phase.next().await {
                    match beat {
                        Beat::Event(result) => outcome = Some(result),
                        Beat::Idle => {
                            yield TutorEvent::Heartbeat;
                        }
                    }
                }
                phase.shutdown().await;
                cancelled(&cancel)?;
                resolve_pre_analysis(outcome, &text, level)?
            } else {
                fallback_pre_analysis(&text, level)
            };

            let input = Arc::new(AgentInput {
                text,
                level,
                pre_analysis: Some(pre_analysis),
            });
            let (reading_tx, reading_rx) = token_channel();
            let (grammar_tx, grammar_rx) = token_channel();
            let (vocabulary_tx, vocabulary_rx) = token_channel();
            let reading = self.spawn_agent(ReadingAgent, &input, reading_tx, &cancel);
            let grammar = self.spawn_agent(GrammarAgent, &input, grammar_tx, &cancel);
            let vocabulary = self.spawn_agent(VocabularyAgent, &input, vocabulary_tx, &cancel);

            let mut mux = Multiplexer::new(
                vec![
                    (Section::Reading, reading_rx),
                    (Section::Grammar, grammar_rx),
                    (Section::Vocabulary, vocabulary_rx),
                ],
                self.config.heartbeat_interval,
            );
            while let Some(item) = mux.next().await {
                match item {
                    MuxItem::Token { key, token } => {
                        yield TutorEvent::Token { section: key, token };
                    }
                    MuxItem::Idle => {
                        yield TutorEvent::Heartbeat;
                    }
                }
            }

            // Join all three before looking at any result, so a cancelled
            // agent never leaves its siblings unawaited.
            let (reading, grammar, vocabulary) = tokio::join!(
                join_agent(Section::Reading, reading),
                join_agent(Section::Grammar, grammar),
                join_agent(Section::Vocabulary, vocabulary),
            );
            let outcomes = AgentOutcomes {
                reading: reading?,
                grammar: grammar?,
                vocabulary: vocabulary?,
            };

            if let Some(message) = outcomes.reading.failure() {
                yield section_error(Section::Reading, message);
            }
            yield TutorEvent::SectionDone { section: Section::Reading };

            if let Some(message) = outcomes.grammar.failure() {
                yield section_error(Section::Grammar, message);
            }
            yield TutorEvent::SectionDone { section: Section::Grammar };

            match &outcomes.vocabulary {
                AgentOutcome::Failed { message } => {
                    yield section_error(Section::Vocabulary, message);
                }
                AgentOutcome::Completed(result) if !result.words.is_empty() => {
                    yield TutorEvent::VocabularyChunk { words: result.words.clone() };
                }
                AgentOutcome::Completed(_) => {}
            }
            yield TutorEvent::SectionDone { section: Section::Vocabulary };

            let response: AnalyzeResponse = aggregate(&session_id, outcomes);
            self.sessions.record_analysis(&session_id, response);
            yield TutorEvent::Done { session_id };
        })
    }

    fn pre_analysis_phase(
        &self,
        text: String,
        level: Level,
        cancel: &CancellationToken,
    ) -> HeartbeatStream<Result<PreAnalysis, EngineError>> {
        let models = Arc::clone(&self.models);
        HeartbeatStream::once(
            async move { run_pre_analysis(&*models, &text, level).await },
            self.config.heartbeat_interval,
            cancel,
        )
    }

    fn ocr_phase(&self, image: ImagePayload, cancel: &CancellationToken) -> HeartbeatStream<Result<String, EngineError>> {
        let models = Arc::clone(&self.models);
        let detail = self.config.ocr_detail;
        HeartbeatStream::once(
            async move { ocr::extract_text(&*models, &image, detail).await },
            self.config.heartbeat_interval,
            cancel,
        )
    }

    fn chat_phase(
        &self,
        session_id: SessionId,
        question: String,
        level: Level,
        cancel: &CancellationToken,
    ) -> HeartbeatStream<Result<String, EngineError>> {
        let models = Arc::clone(&self.models);
        let sessions = Arc::clone(&self.sessions);
        HeartbeatStream::once(
            async move { chat::answer(&*models, &sessions, &session_id, &question, level).await },
            self.config.heartbeat_interval,
            cancel,
        )
    }

    fn spawn_agent<A: TokenAgent>(
        &self,
        agent: A,
        input: &Arc<AgentInput>,
        sink: TokenSender,
        cancel: &CancellationToken,
    ) -> AgentHandle<A::Output> {
        AbortOnDropHandle::new(tokio::spawn(run_producer(
            Arc::new(agent),
            Arc::clone(&self.models),
            Arc::clone(input),
            Some(sink),
            cancel.child_token(),
        )))
    }
}

fn cancelled(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Model result if there is one, otherwise the deterministic fallback.
fn resolve_pre_analysis(
    outcome: Option<Result<PreAnalysis, EngineError>>,
    text: &str,
    level: Level,
) -> Result<PreAnalysis, EngineError> {
    match outcome {
        Some(Ok(pre)) => Ok(pre),
        Some(Err(e)) if e.is_cancelled() => Err(EngineError::Cancelled),
        Some(Err(e)) => {
            warn!(error = %e, "pre-analysis failed, using fallback");
            Ok(fallback_pre_analysis(text, level))
        }
        None => {
            warn!("pre-analysis produced no result, using fallback");
            Ok(fallback_pre_analysis(text, level))
        }
    }
}

async fn join_agent<T>(section: Section, handle: AgentHandle<T>) -> Result<AgentOutcome<T>, EngineError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(EngineError::Cancelled),
        Err(e) => {
            error!(section = %section, error = %e, "agent task panicked");
            Ok(AgentOutcome::Failed {
                message: format!("{section} agent crashed"),
            })
        }
    }
}

fn section_error(section: Section, message: &str) -> TutorEvent {
    TutorEvent::SectionError {
        section,
        message: message.to_string(),
    }
}
