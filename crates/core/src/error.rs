//! Error types for Codepilot.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! generative service, knowledge, and prompt errors. The variants after
//! `Other` carry the control-flow meaning the analysis and chat paths rely on:
//! which failures skip a single file, which stop a batch, and which abort an
//! interactive request before it reaches the network.

use thiserror::Error;

/// Unified error type for Codepilot.
///
/// All functions in the application return `Result<T, AppError>`.
/// We never panic. Errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generative or embedding service errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Context store, analysis and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),

    /// The content source has no file at this path
    #[error("File not found: {0}")]
    NotFound(String),

    /// File content could not be decoded to text
    #[error("Cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Upstream quota or rate limit exhausted; stops the whole batch
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The generative service refused to answer
    #[error("Generation stopped. Reason: {0}")]
    Blocked(String),

    /// A mandatory prompt component does not fit the token budget
    #[error("{component} does not fit the token budget ({required} tokens needed, {available} available)")]
    DoesNotFit {
        component: String,
        required: usize,
        available: usize,
    },

    /// Another interactive request is still in flight
    #[error("A request is already in progress")]
    Busy,

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// Version-control collaborator errors
    #[error("Version control error: {0}")]
    Vcs(String),
}

impl AppError {
    /// Whether this error must stop the remaining analysis batch.
    pub fn is_fatal_batch(&self) -> bool {
        matches!(self, AppError::QuotaExhausted(_))
    }

    /// Short label used in placeholder texts and warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigError",
            AppError::Io(_) => "IoError",
            AppError::Llm(_) => "LlmError",
            AppError::Knowledge(_) => "KnowledgeError",
            AppError::Prompt(_) => "PromptError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Other(_) => "Error",
            AppError::NotFound(_) => "NotFound",
            AppError::Decode { .. } => "DecodeError",
            AppError::QuotaExhausted(_) => "QuotaExhausted",
            AppError::Blocked(_) => "Blocked",
            AppError::DoesNotFit { .. } => "DoesNotFit",
            AppError::Busy => "Busy",
            AppError::Cancelled => "Cancelled",
            AppError::Vcs(_) => "VcsError",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_quota_is_fatal_batch() {
        assert!(AppError::QuotaExhausted("429".into()).is_fatal_batch());
        assert!(!AppError::Llm("timeout".into()).is_fatal_batch());
        assert!(!AppError::Blocked("SAFETY".into()).is_fatal_batch());
    }

    #[test]
    fn test_blocked_message() {
        let err = AppError::Blocked("SAFETY".into());
        assert_eq!(err.to_string(), "Generation stopped. Reason: SAFETY");
    }

    #[test]
    fn test_does_not_fit_message() {
        let err = AppError::DoesNotFit {
            component: "Instructions".into(),
            required: 120,
            available: 100,
        };
        assert!(err.to_string().starts_with("Instructions does not fit"));
        assert_eq!(err.kind(), "DoesNotFit");
    }
}
