//! Ranking of embedded chunks against a question.

use crate::embeddings::{EmbeddingProvider, EmbeddingTask};
use crate::types::ContextItem;
use std::sync::Arc;

/// Calculate cosine similarity between two vectors.
///
/// Vectors of different length or with a zero norm score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Top `top_n` embedded chunks by similarity, highest first.
///
/// The sort is stable, so equal scores keep their original order.
pub fn rank<'a>(query: &[f32], chunks: &[&'a ContextItem], top_n: usize) -> Vec<(&'a ContextItem, f32)> {
    let mut scored: Vec<(&'a ContextItem, f32)> = chunks
        .iter()
        .filter_map(|item| {
            item.embedding
                .as_deref()
                .map(|embedding| (*item, cosine_similarity(query, embedding)))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);
    scored
}

/// Chunks selected for one question.
#[derive(Debug, Clone)]
pub struct Retrieval<'a> {
    /// Ranked chunks first, then chunks that have no embedding
    pub items: Vec<&'a ContextItem>,

    /// False in degraded mode: every chunk, in stored order
    pub ranked: bool,
}

pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    top_n: usize,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, top_n: usize) -> Self {
        Self { embedder, top_n }
    }

    /// Select the chunks most similar to `query`.
    ///
    /// Falls back to all chunks unranked when the query cannot be embedded
    /// or no chunk carries an embedding; this is never an error.
    pub async fn retrieve<'a>(&self, query: &str, chunks: &[&'a ContextItem]) -> Retrieval<'a> {
        if !chunks.iter().any(|item| item.embedding.is_some()) {
            tracing::info!("No embedded chunks; including all {} chunks unranked", chunks.len());
            return degraded(chunks);
        }

        let query_embedding = match self.embedder.embed(query, EmbeddingTask::RetrievalQuery).await {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!("Query embedding failed, including all chunks unranked: {}", err);
                return degraded(chunks);
            }
        };

        let ranked = rank(&query_embedding, chunks, self.top_n);
        if let (Some(first), Some(last)) = (ranked.first(), ranked.last()) {
            tracing::info!(
                "Retrieved {} chunks (top score: {:.3}, lowest: {:.3})",
                ranked.len(),
                first.1,
                last.1
            );
        }

        let mut items: Vec<&'a ContextItem> = ranked.into_iter().map(|(item, _)| item).collect();
        items.extend(chunks.iter().copied().filter(|item| item.embedding.is_none()));
        Retrieval {
            items,
            ranked: true,
        }
    }
}

fn degraded<'a>(chunks: &[&'a ContextItem]) -> Retrieval<'a> {
    Retrieval {
        items: chunks.to_vec(),
        ranked: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use codepilot_core::{AppError, AppResult};

    fn chunk(seq: u32, embedding: Option<Vec<f32>>) -> ContextItem {
        ContextItem::chunk("a.py", seq, format!("chunk {}", seq), embedding)
    }

    /// Embeds every text as the same fixed vector.
    #[derive(Debug)]
    struct FixedProvider(Vec<f32>);

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> AppResult<Vec<Vec<f32>>> {
            Ok(vec![self.0.clone(); texts.len()])
        }
    }

    #[derive(Debug)]
    struct FailingProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn provider_name(&self) -> &str {
            "failing"
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed_batch(&self, _texts: &[String], _task: EmbeddingTask) -> AppResult<Vec<Vec<f32>>> {
            Err(AppError::Llm("offline".to_string()))
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_identical_vectors_rank_ahead_of_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let items = [chunk(1, Some(a.clone())), chunk(2, Some(a.clone())), chunk(3, Some(b))];
        let refs: Vec<&ContextItem> = items.iter().collect();

        let engine = RetrievalEngine::new(Arc::new(FixedProvider(a)), 2);
        let retrieval = engine.retrieve("query", &refs).await;

        assert!(retrieval.ranked);
        let order: Vec<u32> = retrieval.items.iter().map(|i| i.sequence_number).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_rank_descending_with_stable_ties() {
        let items = [
            chunk(1, Some(vec![0.0, 1.0])),
            chunk(2, Some(vec![1.0, 1.0])),
            chunk(3, Some(vec![1.0, 0.0])),
            chunk(4, Some(vec![1.0, 1.0])),
        ];
        let refs: Vec<&ContextItem> = items.iter().collect();
        let ranked = rank(&[1.0, 0.0], &refs, 10);
        let order: Vec<u32> = ranked.iter().map(|(i, _)| i.sequence_number).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[tokio::test]
    async fn test_unembedded_chunks_follow_ranked_ones() {
        let items = [chunk(1, None), chunk(2, Some(vec![1.0, 0.0]))];
        let refs: Vec<&ContextItem> = items.iter().collect();
        let engine = RetrievalEngine::new(Arc::new(FixedProvider(vec![1.0, 0.0])), 5);
        let retrieval = engine.retrieve("q", &refs).await;

        let order: Vec<u32> = retrieval.items.iter().map(|i| i.sequence_number).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_degraded_when_query_embedding_fails() {
        let items = [chunk(1, Some(vec![1.0])), chunk(2, Some(vec![0.5]))];
        let refs: Vec<&ContextItem> = items.iter().collect();
        let engine = RetrievalEngine::new(Arc::new(FailingProvider), 1);
        let retrieval = engine.retrieve("q", &refs).await;

        assert!(!retrieval.ranked);
        assert_eq!(retrieval.items.len(), 2);
    }

    #[tokio::test]
    async fn test_degraded_when_nothing_embedded() {
        let items = [chunk(1, None), chunk(2, None), chunk(3, None)];
        let refs: Vec<&ContextItem> = items.iter().collect();
        let engine = RetrievalEngine::new(Arc::new(MockProvider::new(8)), 1);
        let retrieval = engine.retrieve("q", &refs).await;

        assert!(!retrieval.ranked);
        let order: Vec<u32> = retrieval.items.iter().map(|i| i.sequence_number).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
