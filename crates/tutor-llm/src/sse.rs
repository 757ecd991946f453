use serde::Deserialize;

use tutor_core::errors::GatewayError;
use tutor_core::stream::StreamEvent;

/// One `data:` payload of a server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseData {
    Payload(String),
    /// The `[DONE]` terminator of an OpenAI-style stream.
    Done,
}

/// Extract the data payloads from a block of complete SSE lines.
///
/// Multi-line `data:` fields within one event are joined with `\n`.
/// Comment lines (`:` prefix) and other fields are ignored.
pub fn parse_sse_lines(raw: &str) -> Vec<SseData> {
    let mut out = Vec::new();
    let mut data: Option<String> = None;

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if let Some(d) = data.take() {
                out.push(classify(d));
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut data {
                Some(d) => {
                    d.push('\n');
                    d.push_str(rest);
                }
                None => data = Some(rest.to_string()),
            }
        }
    }

    // Trailing event without blank line
    if let Some(d) = data {
        out.push(classify(d));
    }
    out
}

fn classify(data: String) -> SseData {
    if data.trim() == "[DONE]" {
        SseData::Done
    } else {
        SseData::Payload(data)
    }
}

/// Turns chat-completion chunks into [`StreamEvent`]s.
#[derive(Debug, Default)]
pub struct ChunkParser {
    started: bool,
    finish_reason: Option<String>,
    finished: bool,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, data: &SseData) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if !self.started {
            self.started = true;
            events.push(StreamEvent::Start);
        }

        let payload = match data {
            SseData::Done => {
                events.push(self.finish());
                return events;
            }
            SseData::Payload(p) => p,
        };

        if let Ok(err) = serde_json::from_str::<ErrorEnvelope>(payload) {
            self.finished = true;
            events.push(StreamEvent::Error {
                error: GatewayError::ServerError {
                    status: 500,
                    body: err.error.message.unwrap_or_else(|| payload.clone()),
                },
            });
            return events;
        }

        let chunk: Chunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable stream chunk");
                return events;
            }
        };

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::TextDelta { delta: content });
                }
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                events.push(StreamEvent::ToolCallDelta {
                    index: call.index,
                    arguments_delta: call.function.and_then(|f| f.arguments).unwrap_or_default(),
                });
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        events
    }

    /// Terminal event for a stream that ended without `[DONE]`.
    pub fn finish(&mut self) -> StreamEvent {
        self.finished = true;
        StreamEvent::Done {
            finish_reason: self.finish_reason.take(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: u32,
    function: Option<FunctionFragment>,
}

#[derive(Deserialize)]
struct FunctionFragment {
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(s: &str) -> SseData {
        SseData::Payload(s.to_string())
    }

    #[test]
    fn parse_lines_skips_comments_and_detects_done() {
        let raw = ": keep-alive\n\ndata: {\"a\":1}\n\ndata: [DONE]\n\n";
        assert_eq!(parse_sse_lines(raw), vec![payload("{\"a\":1}"), SseData::Done]);
    }

    #[test]
    fn parse_lines_joins_multiline_data() {
        let raw = "data: first\ndata: second\n\n";
        assert_eq!(parse_sse_lines(raw), vec![payload("first\nsecond")]);
    }

    #[test]
    fn parse_lines_handles_crlf_and_trailing_event() {
        let raw = "data: {\"x\":true}\r\n\r\ndata: tail";
        assert_eq!(parse_sse_lines(raw), vec![payload("{\"x\":true}"), payload("tail")]);
    }

    #[test]
    fn text_chunks_become_deltas() {
        let mut parser = ChunkParser::new();
        let events = parser.parse(&payload(r#"{"choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#));
        assert!(matches!(events[0], StreamEvent::Start));
        assert!(matches!(&events[1], StreamEvent::TextDelta { delta } if delta == "Hel"));

        let events = parser.parse(&payload(r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#));
        assert_eq!(events.len(), 1);

        let events = parser.parse(&SseData::Done);
        assert!(matches!(&events[0], StreamEvent::Done { finish_reason: Some(r) } if r == "stop"));
        assert!(parser.is_finished());
        assert!(parser.parse(&payload(r#"{"choices":[{"delta":{"content":"late"}}]}"#)).is_empty());
    }

    #[test]
    fn empty_content_is_not_a_token() {
        let mut parser = ChunkParser::new();
        let events = parser.parse(&payload(r#"{"choices":[{"delta":{"content":""}}]}"#));
        assert_eq!(events.len(), 1, "only Start expected: {events:?}");
    }

    #[test]
    fn tool_call_fragments_are_tagged() {
        let mut parser = ChunkParser::new();
        let events = parser.parse(&payload(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\""}}]}}]}"#,
        ));
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta { index: 0, arguments_delta } if arguments_delta == "{\"q\""));
    }

    #[test]
    fn in_band_error_ends_stream() {
        let mut parser = ChunkParser::new();
        let events = parser.parse(&payload(r#"{"error":{"message":"overloaded","type":"server_error"}}"#));
        assert!(matches!(&events[1], StreamEvent::Error { error: GatewayError::ServerError { body, .. } } if body == "overloaded"));
        assert!(parser.is_finished());
    }

    #[test]
    fn garbage_payload_is_skipped() {
        let mut parser = ChunkParser::new();
        parser.parse(&payload("{}"));
        assert!(parser.parse(&payload("not json")).is_empty());
    }
}
