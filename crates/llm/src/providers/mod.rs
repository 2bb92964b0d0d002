//! Generative provider implementations.

mod gemini;
mod mock;
mod ollama;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_ENDPOINT};
pub use mock::MockClient;
pub use ollama::OllamaClient;

use codepilot_core::AppError;
use reqwest::StatusCode;

/// Map a non-success HTTP status to the error taxonomy.
///
/// 429 and an explicit `RESOURCE_EXHAUSTED` status mean the quota is spent,
/// which stops a whole analysis batch instead of a single file.
pub fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        return AppError::QuotaExhausted(format!("{} ({}): {}", provider, status, body));
    }
    AppError::Llm(format!("{} API error ({}): {}", provider, status, body))
}

/// Map a transport failure; timeouts stay ordinary per-request failures.
pub fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Llm(format!("{} request timed out: {}", provider, err))
    } else {
        AppError::Llm(format!("Failed to send request to {}: {}", provider, err))
    }
}
