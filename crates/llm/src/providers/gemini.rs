//! Gemini provider implementation.
//!
//! Generative Language API (v1beta): `models/{model}:generateContent` for
//! completions and chat, `models/{model}:countTokens` for exact token counts.
//! A missing candidate or a `promptFeedback.blockReason` is reported as
//! `AppError::Blocked`; HTTP 429 or `RESOURCE_EXHAUSTED` as `QuotaExhausted`.

use super::{status_error, transport_error};
use crate::client::{ChatRequest, LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::types::{ChatMessage, Role};
use codepilot_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: usize,
}

/// Gemini generative client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_GEMINI_ENDPOINT, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> AppResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error("Gemini", status, &error_text));
        }

        Ok(response)
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> AppResult<LlmResponse> {
        let url = self.model_url(model, "generateContent");
        let response: GenerateResponse = self
            .post(&url, request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        into_llm_response(model, response)
    }
}

/// Gemini has no system role inside `contents`; system turns travel as user turns.
fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    messages
        .iter()
        .map(|message| Content {
            role: Some(
                match message.role {
                    Role::Model => "model",
                    Role::User | Role::System => "user",
                }
                .to_string(),
            ),
            parts: vec![Part {
                text: message.content.clone(),
            }],
        })
        .collect()
}

fn into_llm_response(model: &str, response: GenerateResponse) -> AppResult<LlmResponse> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.clone())
    {
        return Err(AppError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Blocked("no candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "empty response".to_string());
        return Err(AppError::Blocked(reason));
    }

    let usage = response
        .usage_metadata
        .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    Ok(LlmResponse {
        content: text,
        model: model.to_string(),
        usage,
        done: true,
    })
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let body = GenerateRequest {
            contents: to_contents(&[ChatMessage::user(request.prompt.clone())]),
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: system.clone(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            }),
        };
        self.generate(&request.model, &body).await
    }

    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn chat(&self, request: &ChatRequest) -> AppResult<LlmResponse> {
        let body = GenerateRequest {
            contents: to_contents(&request.messages),
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
            }),
        };
        self.generate(&request.model, &body).await
    }

    async fn count_tokens(&self, model: &str, messages: &[ChatMessage]) -> AppResult<usize> {
        let url = self.model_url(model, "countTokens");
        let body = CountTokensRequest {
            contents: to_contents(messages),
        };
        let response: CountTokensResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse countTokens response: {}", e)))?;
        Ok(response.total_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_url_strips_prefix() {
        let client = GeminiClient::new("key");
        assert_eq!(
            client.model_url("models/gemini-1.5-flash", "countTokens"),
            format!("{}/models/gemini-1.5-flash:countTokens", DEFAULT_GEMINI_ENDPOINT)
        );
    }

    #[test]
    fn test_system_turns_sent_as_user() {
        let contents = to_contents(&[
            ChatMessage::new(Role::System, "rules"),
            ChatMessage::model("ok"),
        ]);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn test_block_reason_becomes_blocked() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match into_llm_response("m", response) {
            Err(AppError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected blocked, got {:?}", other.map(|r| r.content)),
        }
    }

    #[test]
    fn test_empty_candidate_uses_finish_reason() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"RECITATION"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            into_llm_response("m", response),
            Err(AppError::Blocked(reason)) if reason == "RECITATION"
        ));
    }

    #[test]
    fn test_text_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"world"}]}}],
                "usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3}}"#,
        )
        .unwrap();
        let parsed = into_llm_response("gemini-1.5-flash", response).unwrap();
        assert_eq!(parsed.content, "Hello, world");
        assert_eq!(parsed.usage.total_tokens, 10);
    }
}
