//! Embedding provider trait and factory.

use codepilot_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// How the embedded text will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// A chunk stored for later retrieval
    RetrievalDocument,
    /// A question matched against stored chunks
    RetrievalQuery,
}

impl EmbeddingTask {
    /// Task type name used by the Gemini API.
    pub fn as_api_name(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama", "gemini")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Generate embeddings for multiple texts in one call.
    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str, task: EmbeddingTask) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()], task).await?;
        if results.len() != 1 {
            return Err(AppError::Llm(format!(
                "Expected one embedding, got {}",
                results.len()
            )));
        }
        results
            .pop()
            .ok_or_else(|| AppError::Llm("No embedding returned".to_string()))
    }
}

/// Resolved embedding settings; built once from `AppConfig`.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl EmbeddingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let provider = config.embedding_provider();
        Self {
            model: config.embedding_model(&provider),
            endpoint: config.endpoint(&provider),
            api_key: config.resolve_api_key(&provider),
            timeout: Duration::from_secs(config.analysis.request_timeout_secs),
            provider,
        }
    }
}

/// Create an embedding provider from resolved settings.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(super::providers::MockProvider::new(
            super::providers::mock::DEFAULT_DIMENSIONS,
        ))),

        "ollama" => {
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| super::providers::ollama::DEFAULT_MODEL.to_string());
            let provider = super::providers::OllamaProvider::new(
                settings.endpoint.as_deref(),
                model,
                settings.timeout,
            )?;
            Ok(Arc::new(provider))
        }

        "gemini" => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                AppError::Config("Gemini embeddings require an API key".to_string())
            })?;
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| super::providers::gemini::DEFAULT_MODEL.to_string());
            let provider = super::providers::GeminiProvider::new(
                settings.endpoint.as_deref(),
                api_key,
                model,
                settings.timeout,
            )?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama, gemini",
            settings.provider
        ))),
    }
}
