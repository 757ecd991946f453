use tracing::{info, instrument};

use tutor_core::context::LlmContext;
use tutor_core::ids::SessionId;
use tutor_core::messages::{ChatMessage, Role};
use tutor_core::provider::{AgentRole, ModelSource, StreamOptions};
use tutor_core::task::Level;
use tutor_store::SessionStore;

use crate::error::EngineError;
use crate::prompts;

/// Most recent turns included in the chat prompt.
const HISTORY_TURNS: usize = 10;

fn format_history(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "(없음)".to_string();
    }
    let start = messages.len().saturating_sub(HISTORY_TURNS);
    messages[start..]
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "학생",
                Role::Assistant => "튜터",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answer one follow-up question within a session.
///
/// The prompt carries the turns that came before this question. The question
/// is appended to the history up front; the answer only once the model call
/// succeeds.
#[instrument(skip_all, fields(session_id = %session_id, level = %level))]
pub async fn answer(
    models: &dyn ModelSource,
    sessions: &SessionStore,
    session_id: &SessionId,
    question: &str,
    level: Level,
) -> Result<String, EngineError> {
    let history = sessions
        .get(session_id)
        .map(|s| format_history(&s.messages))
        .unwrap_or_else(|| format_history(&[]));
    sessions.add_message(session_id, Role::User, question);

    let level_str = level.to_string();
    let prompt = prompts::render(
        "chat",
        &[
            ("level", level_str.as_str()),
            ("level_instructions", prompts::level_instructions(level)),
            ("history", history.as_str()),
            ("question", question),
        ],
    )?;

    let client = models.model_for(AgentRole::Chat)?;
    let reply = client
        .complete(&LlmContext::from_prompt(prompt), &StreamOptions::default())
        .await?;
    let reply = reply.trim().to_string();

    sessions.add_message(session_id, Role::Assistant, reply.as_str());
    info!(chars = reply.len(), "chat answered");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::errors::GatewayError;
    use tutor_llm::mock::{MockModels, MockResponse};

    #[tokio::test]
    async fn answer_is_recorded_in_history() {
        let models = MockModels::new().with(
            AgentRole::Chat,
            vec![MockResponse::text("어디에나 있는 이라는 뜻이에요."), MockResponse::text("네.")],
        );
        let sessions = SessionStore::with_ttl_hours(24);
        let id = sessions.create();

        let reply = answer(&models, &sessions, &id, "What does 'ubiquitous' mean?", Level::default())
            .await
            .unwrap();
        assert_eq!(reply, "어디에나 있는 이라는 뜻이에요.");

        let session = sessions.get(&id).unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].role, Role::Assistant);

        answer(&models, &sessions, &id, "Thanks!", Level::default()).await.unwrap();
        let second_prompt = &models.provider(AgentRole::Chat).unwrap().prompts()[1];
        assert!(second_prompt.contains("학생: What does 'ubiquitous' mean?"));
        assert!(second_prompt.contains("튜터: 어디에나 있는"));
        assert!(second_prompt.contains("Thanks!"));
    }

    #[tokio::test]
    async fn failure_records_only_the_question() {
        let models = MockModels::new().with(AgentRole::Chat, vec![MockResponse::Error(GatewayError::Timeout(
            std::time::Duration::from_secs(1),
        ))]);
        let sessions = SessionStore::with_ttl_hours(24);
        let id = sessions.create();
        let err = answer(&models, &sessions, &id, "Why?", Level::default()).await.unwrap_err();
        assert_eq!(err.code(), "processing_error");
        let messages = sessions.get(&id).unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Why?");
    }

    #[test]
    fn history_is_windowed() {
        let turns: Vec<_> = (0..15)
            .map(|i| ChatMessage { role: Role::User, content: format!("q{i}") })
            .collect();
        let history = format_history(&turns);
        assert!(!history.contains("q4\n"));
        assert!(history.starts_with("학생: q5"));
        assert!(history.ends_with("학생: q14"));
        assert_eq!(format_history(&[]), "(없음)");
    }
}
