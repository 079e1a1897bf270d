use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The nested reply object of a chat response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseMessage {
    /// Role reported by the backend, normally `assistant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// The reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Envelope returned by the Ollama `/api/chat` endpoint.
///
/// Exactly one of `message` or `error` is expected; unknown fields such as
/// `done` or `eval_count` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    /// Model that produced the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The reply, when the request succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ResponseMessage>,

    /// The error text, when the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Extract the reply text from the envelope.
    ///
    /// A reply wins over an error; an envelope with neither yields
    /// [`Error::EmptyResponse`].
    pub fn into_reply(self) -> Result<String> {
        if let Some(content) = self.message.and_then(|m| m.content) {
            return Ok(content);
        }
        match self.error {
            Some(error) => Err(Error::backend(error)),
            None => Err(Error::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn reply_is_extracted() {
        let response = parse(json!({"message": {"content": "hi"}}));
        assert_eq!(response.into_reply().unwrap(), "hi");
    }

    #[test]
    fn error_field_is_reported() {
        let response = parse(json!({"error": "boom"}));
        let err = response.into_reply().unwrap_err();
        assert!(err.is_backend());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn message_without_content_falls_through() {
        let response = parse(json!({"message": {"role": "assistant"}, "error": "late"}));
        assert!(response.into_reply().unwrap_err().is_backend());

        let response = parse(json!({"message": {"role": "assistant"}}));
        assert!(response.into_reply().unwrap_err().is_empty_response());
    }

    #[test]
    fn ollama_extras_are_ignored() {
        let response = parse(json!({
            "model": "gpt-oss:latest",
            "created_at": "2024-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "ok"},
            "done": true,
            "eval_count": 12
        }));
        assert_eq!(response.model.as_deref(), Some("gpt-oss:latest"));
        assert_eq!(response.into_reply().unwrap(), "ok");
    }

    #[test]
    fn empty_envelope() {
        assert!(parse(json!({})).into_reply().unwrap_err().is_empty_response());
    }
}
