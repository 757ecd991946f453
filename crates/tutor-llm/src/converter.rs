use serde_json::{json, Value};

use tutor_core::context::LlmContext;
use tutor_core::errors::GatewayError;
use tutor_core::messages::{Message, UserContent};
use tutor_core::provider::StreamOptions;

/// Build a chat-completions request body.
pub fn build_request_body(context: &LlmContext, options: &StreamOptions, model: &str, stream: bool) -> Value {
    let messages: Vec<Value> = context.messages.iter().map(convert_message).collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn convert_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({ "role": "system", "content": content }),
        Message::Assistant { content } => json!({ "role": "assistant", "content": content }),
        Message::User { content } => {
            // Plain text turns go as a string, which every compatible backend accepts.
            if let [UserContent::Text { text }] = content.as_slice() {
                return json!({ "role": "user", "content": text });
            }
            let parts: Vec<Value> = content
                .iter()
                .map(|part| match part {
                    UserContent::Text { text } => json!({ "type": "text", "text": text }),
                    UserContent::Image { url, detail } => json!({
                        "type": "image_url",
                        "image_url": { "url": url, "detail": detail.as_str() },
                    }),
                })
                .collect();
            json!({ "role": "user", "content": parts })
        }
    }
}

/// Pull the answer text out of a non-streaming response body.
pub fn parse_completion(body: &Value) -> Result<String, GatewayError> {
    if let Some(message) = body.pointer("/error/message").and_then(Value::as_str) {
        return Err(GatewayError::ServerError {
            status: 500,
            body: message.to_string(),
        });
    }
    let content = body
        .pointer("/choices/0/message/content")
        .ok_or_else(|| GatewayError::MalformedResponse("missing choices[0].message.content".into()))?;
    match content {
        Value::String(s) => Ok(s.clone()),
        // Refusals and tool-only answers carry a null content.
        Value::Null => Ok(String::new()),
        other => Err(GatewayError::MalformedResponse(format!("unexpected content type: {other}"))),
    }
}
