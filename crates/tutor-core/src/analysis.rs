use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::task::Level;

/// Per-sentence scoring produced by pre-analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceEntry {
    pub text: String,
    pub difficulty: Level,
    pub focus: Vec<String>,
}

/// Shared context handed to every downstream agent. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAnalysis {
    pub sentences: Vec<SentenceEntry>,
    pub overall_difficulty: Level,
    pub focus_summary: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingResult {
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarResult {
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyWord {
    pub word: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyResult {
    pub words: Vec<VocabularyWord>,
}

/// Final, possibly partial, collection of every agent's result for one request.
/// A `None` field means that agent did not complete successfully.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub session_id: SessionId,
    pub reading: Option<ReadingResult>,
    pub grammar: Option<GrammarResult>,
    pub vocabulary: Option<VocabularyResult>,
}

impl AnalyzeResponse {
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            reading: None,
            grammar: None,
            vocabulary: None,
        }
    }

    pub fn completed_sections(&self) -> usize {
        usize::from(self.reading.is_some()) + usize::from(self.grammar.is_some()) + usize::from(self.vocabulary.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_has_no_sections() {
        let resp = AnalyzeResponse::empty(SessionId::from_raw("sess_1"));
        assert_eq!(resp.completed_sections(), 0);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["session_id"], "sess_1");
        assert!(json["reading"].is_null());
    }

    #[test]
    fn completed_sections_counts_present_fields() {
        let mut resp = AnalyzeResponse::empty(SessionId::new());
        resp.grammar = Some(GrammarResult { content: "g".into() });
        resp.vocabulary = Some(VocabularyResult::default());
        assert_eq!(resp.completed_sections(), 2);
    }
}
