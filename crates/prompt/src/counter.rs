//! Token counting for prompt assembly.
//!
//! `ServiceCounter` asks the generative service and degrades to the
//! four-characters heuristic when the service cannot count. After a failure
//! the service is left alone for a cooldown, then asked again.

use codepilot_llm::{estimate_tokens, ChatMessage, LlmClient};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long counting stays on the heuristic after the service failed.
pub const COUNTING_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Size of a message sequence and whether it came from the service tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: usize,
    pub exact: bool,
}

impl TokenCount {
    pub fn estimated(tokens: usize) -> Self {
        Self {
            tokens,
            exact: false,
        }
    }
}

#[async_trait::async_trait]
pub trait TokenCounter: Send + Sync {
    /// Count a message sequence. Never fails; degraded counts are flagged.
    async fn count(&self, messages: &[ChatMessage]) -> TokenCount;
}

/// Offline counter: four characters per token.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCounter;

#[async_trait::async_trait]
impl TokenCounter for HeuristicCounter {
    async fn count(&self, messages: &[ChatMessage]) -> TokenCount {
        TokenCount::estimated(estimate_tokens(messages))
    }
}

/// Counter backed by the generative service's counting facility.
pub struct ServiceCounter {
    client: Arc<dyn LlmClient>,
    model: String,
    retry_after: Duration,
    /// Until when the heuristic is used without asking the service.
    degraded_until: Mutex<Option<Instant>>,
}

impl ServiceCounter {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            retry_after: COUNTING_RETRY_AFTER,
            degraded_until: Mutex::new(None),
        }
    }

    /// Set the cooldown after a failed count.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether counts currently come from the heuristic without asking the service.
    pub fn is_degraded(&self) -> bool {
        let mut degraded_until = self.degraded_until.lock().unwrap_or_else(|e| e.into_inner());
        match *degraded_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *degraded_until = None;
                false
            }
            None => false,
        }
    }

    fn mark_degraded(&self) {
        let mut degraded_until = self.degraded_until.lock().unwrap_or_else(|e| e.into_inner());
        *degraded_until = Some(Instant::now() + self.retry_after);
    }
}

#[async_trait::async_trait]
impl TokenCounter for ServiceCounter {
    async fn count(&self, messages: &[ChatMessage]) -> TokenCount {
        if messages.is_empty() {
            return TokenCount {
                tokens: 0,
                exact: true,
            };
        }
        if self.is_degraded() {
            return TokenCount::estimated(estimate_tokens(messages));
        }

        match self.client.count_tokens(&self.model, messages).await {
            Ok(tokens) => TokenCount {
                tokens,
                exact: true,
            },
            Err(e) => {
                tracing::info!(
                    "Token counting unavailable for {}, using estimate: {}",
                    self.client.provider_name(),
                    e
                );
                self.mark_degraded();
                TokenCount::estimated(estimate_tokens(messages))
            }
        }
    }
}
