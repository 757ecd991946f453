//! Heading cleanup for agent Markdown output.
//!
//! Models drift from the requested layout (bold labels, wrong heading depth,
//! `label:` on its own line). Each pass rewrites such lines to the canonical
//! heading and then guarantees a blank line after every heading. All passes
//! are idempotent. A panic inside a pass returns the input unchanged.

use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::Regex;
use tutor_core::events::Section;

struct Rule {
    pattern: Regex,
    replacement: String,
}

impl Rule {
    /// Matches a whole line holding `label`, optionally bolded, behind any heading
    /// marker, with an optional trailing colon.
    fn label(label: &str, replacement: &str) -> Self {
        let pattern = format!(r"^(?:#{{1,6}}\s+)?(?:\*\*)?{label}(?:\*\*)?\s*:?\s*$");
        Self {
            pattern: Regex::new(&pattern).unwrap(),
            replacement: replacement.to_string(),
        }
    }

    fn raw(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            replacement: replacement.to_string(),
        }
    }
}

static SENTENCE_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| vec![Rule::label(r"문장\s+(\d+)", "### 문장 ${1}")]);

static READING_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    ["단위별 해석", "자연스러운 해석", "읽기 지시"]
        .iter()
        .map(|name| Rule::label(&regex::escape(name), &format!("#### {name}")))
        .collect()
});

static GRAMMAR_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    ["문법 포인트", "왜 이 구조?", "한국어와의 차이", "시험 포인트"]
        .iter()
        .map(|name| Rule::label(&regex::escape(name), &format!("#### {name}")))
        .collect()
});

static VOCAB_WORD_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::raw(r"^#{3,6}\s+([A-Za-z][A-Za-z0-9 \-]*?)\s*$", "## ${1}"),
        Rule::raw(r"^\*\*([A-Za-z][A-Za-z0-9 \-]*?)\*\*:?\s*$", "## ${1}"),
    ]
});

static VOCAB_SUBHEADING_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    [
        (r"1\.\s+기본 뜻", "### 1. 기본 뜻"),
        (r"2\.\s+문장 속 의미", "### 2. 문장 속 의미"),
        (r"3\.\s+핵심 의미 이미지", "### 3. 핵심 의미 이미지"),
        (r"4\.\s+어원[^*:\n]*?", "### 4. 어원 (PIE 어근까지)"),
        (r"5\.\s+같은 어원 파생 단어[^*:\n]*?", "### 5. 같은 어원 파생 단어 (최소 3개)"),
        (r"6\.\s+기억 연결 팁", "### 6. 기억 연결 팁"),
    ]
    .iter()
    .map(|(label, target)| Rule::label(label, target))
    .collect()
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+\S").unwrap());

pub fn normalize(section: Section, raw: &str) -> String {
    match section {
        Section::Reading => normalize_reading(raw),
        Section::Grammar => normalize_grammar(raw),
        Section::Vocabulary => normalize_vocabulary(raw),
    }
}

/// `### 문장 N` plus `####` 단위별 해석 / 자연스러운 해석 / 읽기 지시.
pub fn normalize_reading(raw: &str) -> String {
    guarded(raw, |s| apply(s, &[SENTENCE_RULES.as_slice(), READING_RULES.as_slice()]))
}

/// `### 문장 N` plus `####` 문법 포인트 / 왜 이 구조? / 한국어와의 차이 / 시험 포인트.
pub fn normalize_grammar(raw: &str) -> String {
    guarded(raw, |s| apply(s, &[SENTENCE_RULES.as_slice(), GRAMMAR_RULES.as_slice()]))
}

/// `## word` for English word entries plus numbered `### N. …` subheadings.
pub fn normalize_vocabulary(raw: &str) -> String {
    guarded(raw, |s| apply(s, &[VOCAB_WORD_RULES.as_slice(), VOCAB_SUBHEADING_RULES.as_slice()]))
}

fn guarded(raw: &str, pass: impl FnOnce(&str) -> String) -> String {
    panic::catch_unwind(AssertUnwindSafe(|| pass(raw))).unwrap_or_else(|_| raw.to_string())
}

fn apply(raw: &str, rule_sets: &[&[Rule]]) -> String {
    let lines: Vec<String> = raw.split('\n').map(|line| rewrite_line(line, rule_sets)).collect();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 8);
    for (i, line) in lines.iter().enumerate() {
        out.push(line);
        let next_is_content = lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if HEADING.is_match(line) && next_is_content {
            out.push("");
        }
    }
    out.join("\n")
}

fn rewrite_line(line: &str, rule_sets: &[&[Rule]]) -> String {
    let trimmed = line.trim_end();
    for rules in rule_sets {
        for rule in rules.iter() {
            if rule.pattern.is_match(trimmed) {
                return rule.pattern.replace(trimmed, rule.replacement.as_str()).into_owned();
            }
        }
    }
    line.to_string()
}
