//! Generative provider factory.
//!
//! Creates clients from a provider name plus the resolved endpoint, API key
//! and timeout. Callers pass values already resolved by `AppConfig`; the
//! factory never reads the environment.

use crate::client::LlmClient;
use crate::providers::{GeminiClient, MockClient, OllamaClient};
use crate::types::ProviderType;
use codepilot_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create a generative client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "gemini", "mock")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required by Gemini)
/// * `timeout` - Upper bound for each request
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type: ProviderType = provider.parse().map_err(AppError::Config)?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url).with_timeout(timeout)))
        }
        ProviderType::Gemini => {
            let key = api_key
                .ok_or_else(|| AppError::Config("Gemini provider requires API key".to_string()))?;
            let client = match endpoint {
                Some(url) => GeminiClient::with_base_url(url, key),
                None => GeminiClient::new(key),
            };
            Ok(Arc::new(client.with_timeout(timeout)))
        }
        ProviderType::Mock => Ok(Arc::new(MockClient::new())),
    }
}
