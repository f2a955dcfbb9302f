//! Request body for the chat-completions endpoint.

use super::message::{ChatMessage, MessageRole};
use serde::{Deserialize, Serialize};

/// One `{role, content}` entry of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: MessageRole,
    pub content: String,
}

impl RequestMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for RequestMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self::new(msg.role, msg.content.clone())
    }
}

/// Chat-completions request body. Built fresh for every exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 2000;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            stream: true,
        }
    }

    /// System prompt followed by the trailing `context_size` messages of `history`.
    pub fn from_history(
        model: impl Into<String>,
        system_prompt: &str,
        history: &[ChatMessage],
        context_size: usize,
    ) -> Self {
        let start = history.len().saturating_sub(context_size);
        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(RequestMessage::new(MessageRole::System, system_prompt));
        messages.extend(history[start..].iter().map(RequestMessage::from));

        Self {
            messages,
            ..Self::new(model)
        }
    }

    pub fn message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        self.messages.push(RequestMessage::new(role, content));
        self
    }

    /// Set the temperature, clamped to `[0, 2]`.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = if temperature.is_finite() {
            temperature.clamp(0.0, 2.0)
        } else {
            0.7
        };
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Copy of this body with the `stream` flag forced.
    pub fn with_stream(&self, stream: bool) -> Self {
        Self {
            stream,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_history_keeps_trailing_window() {
        let history: Vec<ChatMessage> = (0..5).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let req = ChatRequest::from_history("deepseek-chat", "be kind", &history, 2);

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, MessageRole::System);
        assert_eq!(req.messages[0].content, "be kind");
        assert_eq!(req.messages[1].content, "m3");
        assert_eq!(req.messages[2].content, "m4");
        assert!(req.stream);
    }

    #[test]
    fn temperature_is_clamped() {
        assert_eq!(ChatRequest::new("m").temperature(3.5).temperature, 2.0);
        assert_eq!(ChatRequest::new("m").temperature(-1.0).temperature, 0.0);
    }

    #[test]
    fn with_stream_only_changes_the_flag() {
        let req = ChatRequest::new("m").message(MessageRole::User, "hi");
        let blocking = req.with_stream(false);
        assert!(!blocking.stream);
        assert_eq!(blocking.messages, req.messages);

        let v = serde_json::to_value(&blocking).unwrap();
        assert_eq!(v["stream"], serde_json::json!(false));
        assert_eq!(v["messages"][0]["role"], serde_json::json!("user"));
    }
}
