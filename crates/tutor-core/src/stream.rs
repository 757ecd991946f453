use crate::errors::GatewayError;

/// Events emitted while a chat model streams its answer.
///
/// Start → (TextDelta | ToolCallDelta)* → Done, with Error possible at any point.
/// Only `TextDelta` carries user-visible tokens; tool-call fragments are
/// surfaced so callers can skip them explicitly.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    TextDelta { delta: String },
    ToolCallDelta { index: u32, arguments_delta: String },
    Done { finish_reason: Option<String> },
    Error { error: GatewayError },
}

impl StreamEvent {
    /// The token carried by this event, if it is non-empty text.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { delta } if !delta.is_empty() => Some(delta),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_empty_text_counts_as_token() {
        assert_eq!(StreamEvent::TextDelta { delta: "hi".into() }.text(), Some("hi"));
        assert_eq!(StreamEvent::TextDelta { delta: String::new() }.text(), None);
        let tool = StreamEvent::ToolCallDelta { index: 0, arguments_delta: "{\"a\"".into() };
        assert_eq!(tool.text(), None);
    }
}
