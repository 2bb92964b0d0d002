//! Generative client abstraction and request/response types.
//!
//! The service contract consumed by analysis and chat:
//! - `complete`: one prompt in, text or a blocked reason out (summaries)
//! - `chat`: an alternating message sequence in, text or a blocked reason out
//! - `count_tokens`: optional; callers degrade to [`estimate_tokens`]

use crate::types::ChatMessage;
use codepilot_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Single-prompt completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the model
    pub prompt: String,

    /// Model identifier (e.g., "llama3", "gemini-1.5-flash")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    /// Create a new request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
        }
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Multi-turn chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_output_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,
}

fn default_true() -> bool {
    true
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Heuristic token count: four characters per token, rounded up per message.
///
/// Additive over messages, so the count of a sequence equals the sum of the
/// counts of its parts.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| m.content.chars().count().div_ceil(4))
        .sum()
}

/// Trait for generative providers.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "gemini").
    fn provider_name(&self) -> &str;

    /// Perform a single-prompt completion.
    ///
    /// Returns `AppError::Blocked` when the service refuses to answer and
    /// `AppError::QuotaExhausted` when the upstream quota is spent.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Continue a role-alternating conversation.
    async fn chat(&self, request: &ChatRequest) -> AppResult<LlmResponse>;

    /// Count the tokens of a message sequence with the provider's tokenizer.
    ///
    /// Providers without a counting endpoint return an error and callers fall
    /// back to [`estimate_tokens`].
    async fn count_tokens(&self, model: &str, messages: &[ChatMessage]) -> AppResult<usize> {
        let _ = (model, messages);
        Err(AppError::Llm(format!(
            "{} does not provide token counting",
            self.provider_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up_per_message() {
        let messages = vec![ChatMessage::user("abcde"), ChatMessage::model("abcd")];
        assert_eq!(estimate_tokens(&messages), 2 + 1);
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_counts_characters_not_bytes() {
        let messages = vec![ChatMessage::user("ééééé")];
        assert_eq!(estimate_tokens(&messages), 2);
    }

    #[test]
    fn test_request_builders() {
        let request = LlmRequest::new("Summarize", "llama3")
            .with_max_tokens(256)
            .with_system("be brief");
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.system.as_deref(), Some("be brief"));

        let chat = ChatRequest::new("llama3", vec![ChatMessage::user("hi")]).with_max_output_tokens(10);
        assert_eq!(chat.max_output_tokens, Some(10));
    }
}
