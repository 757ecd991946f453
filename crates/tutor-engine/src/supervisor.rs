//! Pre-analysis: sentence segmentation and difficulty scoring.

use serde::Deserialize;
use tracing::{debug, info, instrument};

use tutor_core::analysis::{PreAnalysis, SentenceEntry};
use tutor_core::context::LlmContext;
use tutor_core::provider::{AgentRole, ModelSource, StreamOptions};
use tutor_core::task::Level;

use crate::error::EngineError;
use crate::prompts;

const DEFAULT_FOCUS: [&str; 3] = ["reading", "grammar", "vocabulary"];

/// Deterministic stand-in used when the model call is skipped or fails.
///
/// Splits after `.`, `!` or `?` (runs of them count once), gives every
/// sentence the requested level, and uses the default focus tags.
pub fn fallback_pre_analysis(text: &str, level: Level) -> PreAnalysis {
    let sentences = split_sentences(text)
        .into_iter()
        .map(|sentence| SentenceEntry {
            text: sentence.to_string(),
            difficulty: level,
            focus: vec!["reading".to_string()],
        })
        .collect();
    PreAnalysis {
        sentences,
        overall_difficulty: level,
        focus_summary: DEFAULT_FOCUS.iter().map(|s| s.to_string()).collect(),
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let sentence = text[start..end].trim();
        if !sentence.is_empty() && sentence.chars().any(char::is_alphanumeric) {
            sentences.push(sentence);
        }
        start = end;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    sentences: Vec<RawSentence>,
    overall_difficulty: Option<i64>,
    focus_summary: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawSentence {
    #[serde(default)]
    text: String,
    difficulty: Option<i64>,
    focus: Option<Vec<String>>,
}

/// Parse the supervisor's JSON reply, tolerating prose or code fences around it.
/// Difficulties are clamped into range; missing ones default to `level`.
pub fn parse_pre_analysis(reply: &str, level: Level) -> Result<PreAnalysis, EngineError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => return Err(EngineError::Internal("no JSON object in pre-analysis reply".into())),
    };
    let raw: RawAnalysis =
        serde_json::from_str(json).map_err(|e| EngineError::Internal(format!("invalid pre-analysis JSON: {e}")))?;

    let clamp = |d: Option<i64>| d.map_or(level, Level::clamped);
    let sentences = raw
        .sentences
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| SentenceEntry {
            text: s.text,
            difficulty: clamp(s.difficulty),
            focus: s.focus.unwrap_or_else(|| vec!["reading".to_string()]),
        })
        .collect();

    Ok(PreAnalysis {
        sentences,
        overall_difficulty: clamp(raw.overall_difficulty),
        focus_summary: raw
            .focus_summary
            .unwrap_or_else(|| DEFAULT_FOCUS.iter().map(|s| s.to_string()).collect()),
    })
}

/// One non-streaming supervisor call.
#[instrument(skip_all, fields(level = %level))]
pub async fn run_pre_analysis(models: &dyn ModelSource, text: &str, level: Level) -> Result<PreAnalysis, EngineError> {
    let client = models.model_for(AgentRole::Supervisor)?;
    let level_str = level.to_string();
    let prompt = prompts::render("supervisor", &[("text", text), ("level", level_str.as_str())])?;
    let reply = client.complete(&LlmContext::from_prompt(prompt), &StreamOptions::default()).await?;
    debug!(chars = reply.len(), "supervisor replied");

    let analysis = parse_pre_analysis(&reply, level)?;
    info!(
        sentences = analysis.sentences.len(),
        overall_difficulty = %analysis.overall_difficulty,
        "pre-analysis complete"
    );
    Ok(analysis)
}
