//! Vector index collaborators: chunk storage plus similarity search.
//!
//! Two implementations share the [`VectorIndex`] capability: [`QdrantVectorIndex`] persists
//! vectors in a Qdrant collection, while [`InMemoryVectorIndex`] keeps them in process memory
//! for offline runs and tests.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantVectorIndex;

use crate::{
    config::{Config, VectorStoreKind},
    embedding::{EmbeddingClient, EmbeddingClientError},
    model::{Chunk, ScoredChunk},
    qdrant::{QdrantError, QdrantService},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by vector index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed to vectorize chunk or query text.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Backing store rejected the request.
    #[error(transparent)]
    Store(#[from] QdrantError),
    /// Embedding dimension does not match the configured collection.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured vector size.
        expected: usize,
        /// Length of the vector the provider returned.
        actual: usize,
    },
    /// Provider returned a different number of vectors than texts submitted.
    #[error("embedding provider returned {actual} vectors for {expected} texts")]
    EmbeddingCount {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
}

/// Stores chunks and answers similarity queries over them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a batch of chunks, replacing any stored chunk with the same id. Returns the number
    /// of chunks written.
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError>;

    /// Return up to `top_k` chunks most similar to `query`, best match first.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, IndexError>;
}

/// Build the vector index selected by configuration.
pub fn build_vector_index(
    config: &Config,
    embedder: Arc<dyn EmbeddingClient>,
) -> Result<Arc<dyn VectorIndex>, IndexError> {
    match config.vector_store {
        VectorStoreKind::Memory => {
            tracing::info!("Using in-memory vector index");
            Ok(Arc::new(InMemoryVectorIndex::new(embedder)))
        }
        VectorStoreKind::Qdrant => {
            let service = QdrantService::new(
                &config.qdrant_url,
                config.qdrant_api_key.clone(),
                config.request_timeout,
            )?;
            tracing::info!(
                collection = %config.qdrant_collection_name,
                "Using Qdrant vector index"
            );
            Ok(Arc::new(QdrantVectorIndex::new(
                service,
                config.qdrant_collection_name.clone(),
                embedder,
                config.embedding_dimension,
            )))
        }
    }
}

/// Embed `texts`, checking that one vector comes back per text.
pub(crate) async fn embed_all(
    embedder: &dyn EmbeddingClient,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let expected = texts.len();
    let vectors = embedder.generate_embeddings(texts).await?;
    if vectors.len() != expected {
        return Err(IndexError::EmbeddingCount {
            expected,
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}
