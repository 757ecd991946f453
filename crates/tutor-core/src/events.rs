use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analysis::VocabularyWord;
use crate::ids::SessionId;

/// The three streamed analysis sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Reading,
    Grammar,
    Vocabulary,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Reading, Section::Grammar, Section::Vocabulary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-level event vocabulary streamed to clients.
///
/// Every variant except [`TutorEvent::Heartbeat`] has a type tag and a JSON
/// payload. The heartbeat is a transport keep-alive with neither.
#[derive(Clone, Debug, PartialEq)]
pub enum TutorEvent {
    Token { section: Section, token: String },
    SectionDone { section: Section },
    SectionError { section: Section, message: String },
    VocabularyChunk { words: Vec<VocabularyWord> },
    ChatChunk { content: String },
    Done { session_id: SessionId },
    Error { message: String, code: String },
    Heartbeat,
}

impl TutorEvent {
    /// Wire type tag, `None` for the keep-alive.
    pub fn event_type(&self) -> Option<String> {
        let tag = match self {
            Self::Token { section, .. } => format!("{section}_token"),
            Self::SectionDone { section } => format!("{section}_done"),
            Self::SectionError { section, .. } => format!("{section}_error"),
            Self::VocabularyChunk { .. } => "vocabulary_chunk".to_owned(),
            Self::ChatChunk { .. } => "chat_chunk".to_owned(),
            Self::Done { .. } => "done".to_owned(),
            Self::Error { .. } => "error".to_owned(),
            Self::Heartbeat => return None,
        };
        Some(tag)
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Token { token, .. } => json!({ "token": token }),
            Self::SectionDone { .. } | Self::Heartbeat => json!({}),
            Self::SectionError { message, .. } => json!({ "message": message }),
            Self::VocabularyChunk { words } => json!({ "words": words }),
            Self::ChatChunk { content } => json!({ "content": content, "role": "assistant" }),
            Self::Done { session_id } => json!({ "session_id": session_id, "status": "complete" }),
            Self::Error { message, code } => json!({ "message": message, "code": code }),
        }
    }
}
