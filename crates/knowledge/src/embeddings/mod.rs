//! Embedding providers.
//!
//! Vectors are requested per batch with a task hint: chunks are embedded as
//! retrieval documents during analysis, questions as retrieval queries.
//! Providers return one vector per input text, in input order; callers
//! still check the count before correlating by position.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider, EmbeddingSettings, EmbeddingTask};
