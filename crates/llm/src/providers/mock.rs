//! Deterministic offline client.
//!
//! Summaries echo the first non-empty line of the file embedded in the
//! prompt; chat replies echo the last user message. Token counts use the
//! four-characters heuristic so budget code can exercise the counting path.

use crate::client::{estimate_tokens, ChatRequest, LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::types::{ChatMessage, Role};
use codepilot_core::AppResult;

#[derive(Debug, Default, Clone)]
pub struct MockClient;

impl MockClient {
    pub fn new() -> Self {
        Self
    }

    fn respond(model: &str, content: String, prompt_tokens: usize) -> LlmResponse {
        let completion_tokens = content.chars().count().div_ceil(4);
        LlmResponse {
            content,
            model: model.to_string(),
            usage: LlmUsage::new(prompt_tokens as u32, completion_tokens as u32),
            done: true,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let first_line = request
            .prompt
            .lines()
            .skip_while(|line| !line.starts_with("--- START OF FILE"))
            .skip(1)
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim();
        let summary = format!("This file starts with `{}`.", first_line);
        let prompt_tokens = estimate_tokens(&[ChatMessage::user(request.prompt.clone())]);
        Ok(Self::respond(&request.model, summary, prompt_tokens))
    }

    async fn chat(&self, request: &ChatRequest) -> AppResult<LlmResponse> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let reply = format!("You asked: {}", last_user);
        Ok(Self::respond(&request.model, reply, estimate_tokens(&request.messages)))
    }

    async fn count_tokens(&self, _model: &str, messages: &[ChatMessage]) -> AppResult<usize> {
        Ok(estimate_tokens(messages))
    }
}
