//! Ollama embedding provider.
//!
//! Uses the batch endpoint `/api/embed`, which accepts a list of inputs and
//! returns one vector per input in order. Connection failures are retried
//! with exponential backoff; HTTP errors and timeouts are not.

use crate::embeddings::provider::{EmbeddingProvider, EmbeddingTask};
use codepilot_core::{AppError, AppResult};
use codepilot_llm::providers::{status_error, transport_error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "nomic-embed-text";
const EMBED_ENDPOINT: &str = "/api/embed";

/// Maximum attempts for requests that could not connect
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Outcome of one attempt; only connection failures are retried.
enum Attempt {
    Unreachable(reqwest::Error),
    Failed(AppError),
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>, model: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, EMBED_ENDPOINT)
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Attempt> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Attempt::Unreachable(e)
                } else {
                    Attempt::Failed(transport_error("Ollama", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Attempt::Failed(status_error("Ollama", status, &body)));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            Attempt::Failed(AppError::Llm(format!("Failed to parse Ollama response: {}", e)))
        })?;
        Ok(body.embeddings)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(texts).await {
                Ok(embeddings) => {
                    debug!("Received {} embeddings", embeddings.len());
                    return Ok(embeddings);
                }
                Err(Attempt::Unreachable(e)) if attempt < MAX_RETRIES => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Ollama unreachable (attempt {}/{}), retrying in {}ms: {}",
                        attempt, MAX_RETRIES, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(Attempt::Unreachable(e)) => {
                    return Err(AppError::Llm(format!(
                        "Ollama not available at {}. Ensure Ollama is running and model '{}' is installed: {}",
                        self.base_url, self.model, e
                    )))
                }
                Err(Attempt::Failed(e)) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_defaults() {
        let provider =
            OllamaProvider::new(Some("http://gpu-box:11434/"), DEFAULT_MODEL, Duration::from_secs(5))
                .unwrap();
        assert_eq!(provider.url(), "http://gpu-box:11434/api/embed");
        assert_eq!(provider.model_name(), "nomic-embed-text");

        let local = OllamaProvider::new(None, "mxbai-embed-large", Duration::from_secs(5)).unwrap();
        assert_eq!(local.url(), "http://localhost:11434/api/embed");
    }

    #[test]
    fn test_batch_request_shape() {
        let input = vec!["first".to_string(), "second".to_string()];
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"][1], "second");
        assert_eq!(json["model"], "nomic-embed-text");
    }

    #[test]
    fn test_response_parsing() {
        let body: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]]}"#).unwrap();
        assert_eq!(body.embeddings.len(), 2);
        assert_eq!(body.embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let provider = OllamaProvider::new(Some("http://127.0.0.1:9"), DEFAULT_MODEL, Duration::from_secs(1)).unwrap();
        let result = provider.embed_batch(&[], EmbeddingTask::RetrievalDocument).await.unwrap();
        assert!(result.is_empty());
    }
}
