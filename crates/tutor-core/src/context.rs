use crate::messages::{ImageDetail, Message, UserContent};

/// The complete conversation sent to a provider for one call.
#[derive(Clone, Debug, Default)]
pub struct LlmContext {
    pub messages: Vec<Message>,
}

impl LlmContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single user turn holding a rendered prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user_text(prompt)],
        }
    }

    /// A single user turn carrying an image followed by an instruction.
    pub fn with_image(image_url: impl Into<String>, detail: ImageDetail, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::User {
                content: vec![
                    UserContent::Image {
                        url: image_url.into(),
                        detail,
                    },
                    UserContent::Text { text: prompt.into() },
                ],
            }],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Concatenated text of every user turn. Used by test doubles to assert on prompts.
    pub fn user_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            if let Message::User { content } = message {
                for part in content {
                    if let UserContent::Text { text } = part {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }
}
