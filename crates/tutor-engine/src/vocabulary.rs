use tutor_core::analysis::VocabularyWord;

/// Split normalized vocabulary Markdown into word entries.
///
/// Entries start at `## word` lines. Only headings beginning with an ASCII
/// letter count as words; anything before the first heading is ignored, and
/// trailing `---` separators are stripped from each body.
pub fn parse_vocabulary(content: &str) -> Vec<VocabularyWord> {
    let mut words = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        if let Some(word) = word_heading(line) {
            if let Some((prev, body)) = current.take() {
                push_entry(&mut words, prev, &body);
            }
            current = Some((word.to_string(), Vec::new()));
        } else if line.starts_with("## ") {
            // A non-word h2 ends the current entry.
            if let Some((prev, body)) = current.take() {
                push_entry(&mut words, prev, &body);
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((word, body)) = current {
        push_entry(&mut words, word, &body);
    }
    words
}

fn word_heading(line: &str) -> Option<&str> {
    let word = line.strip_prefix("## ")?.trim();
    word.starts_with(|c: char| c.is_ascii_alphabetic()).then_some(word)
}

fn push_entry(words: &mut Vec<VocabularyWord>, word: String, body: &[&str]) {
    let joined = body.join("\n");
    let content = joined.trim().trim_end_matches('-').trim();
    if !content.is_empty() {
        words.push(VocabularyWord {
            word,
            content: content.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_word_headings() {
        let md = "## ubiquitous\n\n### 1. 기본 뜻\n\n어디에나 있는\n\n---\n\n## resilient\n\n### 1. 기본 뜻\n\n회복력 있는\n";
        let words = parse_vocabulary(md);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "ubiquitous");
        assert_eq!(words[0].content, "### 1. 기본 뜻\n\n어디에나 있는");
        assert_eq!(words[1].word, "resilient");
    }

    #[test]
    fn preamble_is_ignored() {
        let md = "오늘의 단어입니다.\n\n## ethic\n\n윤리";
        let words = parse_vocabulary(md);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].content, "윤리");
    }

    #[test]
    fn korean_headings_are_not_words() {
        let md = "## ethic\n\n윤리\n\n## 출력 형식 원칙\n\n무시할 내용";
        let words = parse_vocabulary(md);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].content, "윤리");
    }

    #[test]
    fn empty_entries_are_dropped() {
        assert!(parse_vocabulary("## ghost\n\n---\n").is_empty());
        assert!(parse_vocabulary("").is_empty());
    }

    #[test]
    fn deeper_headings_stay_in_body() {
        let words = parse_vocabulary("## word\n### 2. 문장 속 의미\nmeaning");
        assert_eq!(words[0].content, "### 2. 문장 속 의미\nmeaning");
    }
}
