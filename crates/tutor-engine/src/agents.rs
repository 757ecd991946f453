//! The three streamed analysis agents.

use tutor_core::analysis::{GrammarResult, ReadingResult, VocabularyResult};
use tutor_core::context::LlmContext;
use tutor_core::events::Section;
use tutor_core::provider::AgentRole;

use crate::error::EngineError;
use crate::normalize::{normalize_grammar, normalize_reading, normalize_vocabulary};
use crate::producer::{AgentInput, TokenAgent};
use crate::prompts;
use crate::vocabulary::parse_vocabulary;

/// Render the section template shared by all three agents.
fn section_prompt(section: Section, input: &AgentInput) -> Result<LlmContext, EngineError> {
    let level = input.level.to_string();
    let supervisor_context = prompts::supervisor_context(input.pre_analysis.as_ref());
    let prompt = prompts::render(
        section.as_str(),
        &[
            ("text", input.text.as_str()),
            ("level", level.as_str()),
            ("level_instructions", prompts::level_instructions(input.level)),
            ("supervisor_context", supervisor_context.as_str()),
        ],
    )?;
    Ok(LlmContext::from_prompt(prompt))
}

pub struct ReadingAgent;

impl TokenAgent for ReadingAgent {
    type Output = ReadingResult;

    fn role(&self) -> AgentRole {
        AgentRole::Reading
    }

    fn context(&self, input: &AgentInput) -> Result<LlmContext, EngineError> {
        section_prompt(Section::Reading, input)
    }

    fn finish(&self, raw: String) -> ReadingResult {
        ReadingResult {
            content: normalize_reading(&raw),
        }
    }
}

pub struct GrammarAgent;

impl TokenAgent for GrammarAgent {
    type Output = GrammarResult;

    fn role(&self) -> AgentRole {
        AgentRole::Grammar
    }

    fn context(&self, input: &AgentInput) -> Result<LlmContext, EngineError> {
        section_prompt(Section::Grammar, input)
    }

    fn finish(&self, raw: String) -> GrammarResult {
        GrammarResult {
            content: normalize_grammar(&raw),
        }
    }
}

/// Streams Markdown like the others, but its result is the parsed word list.
pub struct VocabularyAgent;

impl TokenAgent for VocabularyAgent {
    type Output = VocabularyResult;

    fn role(&self) -> AgentRole {
        AgentRole::Vocabulary
    }

    fn context(&self, input: &AgentInput) -> Result<LlmContext, EngineError> {
        section_prompt(Section::Vocabulary, input)
    }

    fn finish(&self, raw: String) -> VocabularyResult {
        VocabularyResult {
            words: parse_vocabulary(&normalize_vocabulary(&raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::analysis::PreAnalysis;
    use tutor_core::task::Level;

    fn input(pre: Option<PreAnalysis>) -> AgentInput {
        AgentInput {
            text: "The cat sat on the mat.".into(),
            level: Level::new(2).unwrap(),
            pre_analysis: pre,
        }
    }

    #[test]
    fn prompts_carry_text_level_and_context() {
        let pre = PreAnalysis {
            sentences: vec![],
            overall_difficulty: Level::new(4).unwrap(),
            focus_summary: vec!["grammar".into()],
        };
        let prompt = GrammarAgent.context(&input(Some(pre))).unwrap().user_text();
        assert!(prompt.contains("The cat sat on the mat."));
        assert!(prompt.contains("학생 레벨: 2/5"));
        assert!(prompt.contains("레벨 2 (초급)"));
        assert!(prompt.contains("전체 난이도: 4/5"));
    }

    #[test]
    fn prompt_without_pre_analysis_has_no_context_block() {
        let prompt = ReadingAgent.context(&input(None)).unwrap().user_text();
        assert!(!prompt.contains("[사전 분석]"));
    }

    #[test]
    fn roles() {
        assert_eq!(ReadingAgent.role(), AgentRole::Reading);
        assert_eq!(GrammarAgent.role(), AgentRole::Grammar);
        assert_eq!(VocabularyAgent.role(), AgentRole::Vocabulary);
    }

    #[test]
    fn reading_finish_normalizes() {
        let result = ReadingAgent.finish("**문장 1**\n단위별 해석:\nThe cat / 고양이".into());
        assert_eq!(result.content, "### 문장 1\n\n#### 단위별 해석\n\nThe cat / 고양이");
    }

    #[test]
    fn vocabulary_finish_parses_words() {
        let raw = "단어 목록\n**ethic**\n1. 기본 뜻\n윤리\n---\n### moral\n도덕의";
        let result = VocabularyAgent.finish(raw.into());
        let words: Vec<_> = result.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["ethic", "moral"]);
        assert_eq!(result.words[0].content, "### 1. 기본 뜻\n\n윤리");
    }

    #[test]
    fn vocabulary_without_headings_is_empty() {
        assert!(VocabularyAgent.finish("no words here".into()).words.is_empty());
    }
}
