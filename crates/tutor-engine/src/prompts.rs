//! Prompt templates embedded at compile time.
//!
//! Placeholders are `{name}` with a lowercase identifier. Any other brace
//! (JSON examples in the supervisor prompt) is left alone.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tutor_core::analysis::PreAnalysis;
use tutor_core::task::Level;

use crate::error::EngineError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

const TEMPLATES: &[(&str, &str)] = &[
    ("supervisor", include_str!("prompts/supervisor.md")),
    ("reading", include_str!("prompts/reading.md")),
    ("grammar", include_str!("prompts/grammar.md")),
    ("vocabulary", include_str!("prompts/vocabulary.md")),
    ("ocr", include_str!("prompts/ocr.md")),
    ("chat", include_str!("prompts/chat.md")),
];

const LEVEL_INSTRUCTIONS: [&str; 5] = [
    "레벨 1 (기초): 중학교 1-2학년 수준. 모든 설명을 아주 쉬운 한국어로 하고, 문법 용어는 쓰지 말거나 바로 풀어서 설명하라. 단어는 가장 기본적인 것만 고른다.",
    "레벨 2 (초급): 중학교 3학년 수준. 기본 문법 용어(주어, 동사, 목적어)는 써도 되지만 예시를 함께 들어라. 문장은 짧은 단위로 끊어 설명하라.",
    "레벨 3 (중급): 고등학교 1학년 수준. 표준 문법 용어를 사용하고, 구문이 복잡한 문장을 중심으로 설명하라. 수능 기출 빈도가 높은 단어를 우선한다.",
    "레벨 4 (중상급): 고등학교 2-3학년 수준. 간결하게 설명하고 글의 논리 흐름과 함축 의미까지 짚어라. 추상 어휘와 다의어를 우선한다.",
    "레벨 5 (고급): 수능 1등급 목표. 기본 설명은 생략하고 고난도 구문, 어법 함정, 빈칸 추론에 쓰일 만한 핵심 표현만 다뤄라.",
];

/// Look up a template by name.
pub fn template(name: &str) -> Option<&'static str> {
    TEMPLATES.iter().find(|(n, _)| *n == name).map(|(_, body)| *body)
}

/// Render `name` with `vars`.
///
/// Fails if the template is unknown or one of its placeholders has no value.
/// Values are inserted verbatim and never re-scanned for placeholders.
pub fn render(name: &str, vars: &[(&str, &str)]) -> Result<String, EngineError> {
    let body = template(name).ok_or_else(|| EngineError::Prompt(format!("unknown template: {name}")))?;

    if let Some(missing) = PLACEHOLDER
        .captures_iter(body)
        .map(|c| c.get(1).map_or("", |m| m.as_str()))
        .find(|key| !vars.iter().any(|(k, _)| k == key))
    {
        return Err(EngineError::Prompt(format!("template {name} is missing variable {missing}")));
    }

    let rendered = PLACEHOLDER.replace_all(body, |caps: &Captures<'_>| {
        let key = caps.get(1).map_or("", |m| m.as_str());
        vars.iter().find(|(k, _)| *k == key).map_or("", |(_, v)| *v).to_string()
    });
    Ok(rendered.into_owned())
}

pub fn level_instructions(level: Level) -> &'static str {
    LEVEL_INSTRUCTIONS[usize::from(level.get().clamp(1, 5)) - 1]
}

/// The `[사전 분석]` block appended to agent prompts. Empty without a pre-analysis.
pub fn supervisor_context(pre: Option<&PreAnalysis>) -> String {
    match pre {
        Some(pre) => format!(
            "\n\n[사전 분석]\n전체 난이도: {}/5\n학습 포커스: {}",
            pre.overall_difficulty,
            pre.focus_summary.join(", ")
        ),
        None => String::new(),
    }
}
