//! Generative service integration for Codepilot.
//!
//! This crate provides a provider-agnostic abstraction over the generative
//! model: one-shot completions (used for file summaries), multi-turn chat,
//! and token counting. Providers plug in behind the [`LlmClient`] trait.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Gemini**: Google Generative Language API
//! - **Mock**: Deterministic offline client for tests and dry runs
//!
//! # Example
//! ```no_run
//! use codepilot_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{estimate_tokens, ChatRequest, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, MockClient, OllamaClient};
pub use types::{ChatMessage, ProviderType, Role};
