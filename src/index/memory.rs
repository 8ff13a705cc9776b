//! Process-local vector index with brute-force cosine search.

use super::{IndexError, VectorIndex, embed_all};
use crate::{
    embedding::EmbeddingClient,
    model::{Chunk, ScoredChunk},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine-similarity index held in process memory.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn EmbeddingClient>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index that vectorizes text with `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the index holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), texts).await?;

        let mut entries = self.entries.write().await;
        let count = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            match entries.iter_mut().find(|entry| entry.chunk.id == chunk.id) {
                Some(existing) => {
                    existing.chunk = chunk;
                    existing.vector = vector;
                }
                None => entries.push(Entry { chunk, vector }),
            }
        }
        tracing::debug!(added = count, total = entries.len(), "Chunks stored in memory");
        Ok(count)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = embed_all(self.embedder.as_ref(), vec![query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|entry| {
                ScoredChunk::new(
                    entry.chunk.clone(),
                    cosine_similarity(&query_vector, &entry.vector),
                )
            })
            .collect();
        scored.sort_by(|a, b| b.retrieval_score.total_cmp(&a.retrieval_score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Cosine similarity of two vectors; zero when either is empty, zero-length or mismatched.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashEmbeddingClient};
    use crate::model::Metadata;

    /// Embeds text by counting a few marker words so similarity is predictable.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingClient for KeywordEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts
                .iter()
                .map(|text| {
                    ["rust", "python", "cooking"]
                        .iter()
                        .map(|word| text.matches(word).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk::new(id, text, Metadata::new())
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let index = InMemoryVectorIndex::new(Arc::new(KeywordEmbedder));
        index
            .add(vec![
                chunk("a", "cooking pasta"),
                chunk("b", "rust and python"),
                chunk("c", "rust rust rust"),
            ])
            .await
            .expect("add");

        let results = index.search("rust", 2).await.expect("search");
        let ids: Vec<_> = results.iter().map(|hit| hit.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!((results[0].retrieval_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn re_adding_an_id_replaces_the_chunk() {
        let index = InMemoryVectorIndex::new(Arc::new(HashEmbeddingClient::new(8)));
        index.add(vec![chunk("a", "old text")]).await.expect("add");
        index.add(vec![chunk("a", "new text")]).await.expect("add");
        assert_eq!(index.len().await, 1);

        let results = index.search("new text", 5).await.expect("search");
        assert_eq!(results[0].chunk.text, "new text");
    }

    #[tokio::test]
    async fn empty_index_and_zero_width_return_nothing() {
        let index = InMemoryVectorIndex::new(Arc::new(HashEmbeddingClient::new(8)));
        assert!(index.is_empty().await);
        assert!(index.search("anything", 3).await.expect("search").is_empty());
        assert_eq!(index.add(Vec::new()).await.expect("add"), 0);

        index.add(vec![chunk("a", "text")]).await.expect("add");
        assert!(index.search("text", 0).await.expect("search").is_empty());
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
