use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Numeric generation parameters, passed through to the backend verbatim.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    pub num_predict: u32,
}

impl GenerationOptions {
    /// Create a new `GenerationOptions`.
    pub fn new(temperature: f32, num_predict: u32) -> Self {
        Self {
            temperature,
            num_predict,
        }
    }
}

/// Body of a request to the Ollama `/api/chat` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// The conversation, in order.
    pub messages: Vec<Message>,

    /// Generation options.
    pub options: GenerationOptions,

    /// Whether the backend should stream its answer.
    pub stream: bool,
}

impl ChatRequest {
    /// Assemble the message list for a request.
    ///
    /// The system prompt leads only when it is non-empty; `history` follows in
    /// order and the new user message comes last.
    pub fn build_messages(
        system_prompt: &str,
        user_message: &str,
        history: &[Message],
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.extend_from_slice(history);
        messages.push(Message::user(user_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn request_wire_shape() {
        let request = ChatRequest {
            model: "gpt-oss:latest".to_string(),
            messages: ChatRequest::build_messages("", "hi", &[]),
            options: GenerationOptions::new(0.5, 256),
            stream: false,
        };
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-oss:latest",
                "messages": [{"role": "user", "content": "hi"}],
                "options": {"temperature": 0.5, "num_predict": 256},
                "stream": false
            })
        );
    }

    #[test]
    fn system_prompt_leads_history() {
        let history = vec![Message::user("a"), Message::assistant("b")];
        let messages = ChatRequest::build_messages("persona", "c", &history);
        assert_eq!(
            messages,
            vec![
                Message::system("persona"),
                Message::user("a"),
                Message::assistant("b"),
                Message::user("c"),
            ]
        );
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = ChatRequest::build_messages("", "c", &[Message::assistant("b")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::assistant("b"));
    }
}
