//! Vector index backed by a Qdrant collection.

use super::{IndexError, VectorIndex, embed_all};
use crate::{
    embedding::EmbeddingClient,
    model::{Chunk, ScoredChunk},
    qdrant::{
        PointInsert, QdrantService, compute_chunk_hash, payload::chunk_from_payload,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Vector index persisted in a Qdrant collection.
///
/// The collection and its payload indexes are created on first use.
pub struct QdrantVectorIndex {
    service: QdrantService,
    collection: String,
    embedder: Arc<dyn EmbeddingClient>,
    dimension: usize,
    ready: OnceCell<()>,
}

impl QdrantVectorIndex {
    /// Wrap a Qdrant client for `collection`, whose vectors have `dimension` entries.
    pub fn new(
        service: QdrantService,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingClient>,
        dimension: usize,
    ) -> Self {
        Self {
            service,
            collection: collection.into(),
            embedder,
            dimension,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_collection(&self) -> Result<(), IndexError> {
        self.ready
            .get_or_try_init(|| async {
                self.service
                    .create_collection_if_not_exists(&self.collection, self.dimension as u64)
                    .await?;
                self.service.ensure_payload_indexes(&self.collection).await?;
                Ok::<(), IndexError>(())
            })
            .await?;
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), texts).await?;

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            self.check_dimension(&vector)?;
            points.push(PointInsert {
                chunk_hash: compute_chunk_hash(&chunk.text),
                id: chunk.id,
                text: chunk.text,
                metadata: chunk.metadata,
                vector,
            });
        }

        let stored = self.service.upsert_points(&self.collection, points).await?;
        tracing::info!(collection = %self.collection, stored, "Chunks indexed");
        Ok(stored)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.ensure_collection().await?;

        let vector = embed_all(self.embedder.as_ref(), vec![query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();
        self.check_dimension(&vector)?;

        let points = self
            .service
            .search_points(&self.collection, vector, top_k)
            .await?;

        let results = points
            .into_iter()
            .filter_map(|point| {
                let score = point.score;
                match chunk_from_payload(point.id.clone(), point.payload) {
                    Some(chunk) => Some(ScoredChunk::new(chunk, score)),
                    None => {
                        tracing::warn!(point = %point.id, "Skipping point without text payload");
                        None
                    }
                }
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::model::{Metadata, TITLE_KEY};
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;
    use std::time::Duration;

    fn index(server: &MockServer, dimension: usize, embedder_dimension: usize) -> QdrantVectorIndex {
        let service =
            QdrantService::new(&server.base_url(), None, Duration::from_secs(5)).expect("service");
        QdrantVectorIndex::new(
            service,
            "docs",
            Arc::new(HashEmbeddingClient::new(embedder_dimension)),
            dimension,
        )
    }

    async fn mock_existing_collection(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
    }

    #[tokio::test]
    async fn add_upserts_points_with_hash_and_metadata() {
        let server = MockServer::start_async().await;
        mock_existing_collection(&server).await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .json_body_partial(
                        r#"{"points":[{"id":"c-1","payload":{"text":"hello","metadata":{"title":"Guide"}}}]}"#,
                    );
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let mut metadata = Metadata::new();
        metadata.insert(TITLE_KEY.into(), "Guide".into());
        let stored = index(&server, 4, 4)
            .add(vec![Chunk::new("c-1", "hello", metadata)])
            .await
            .expect("add");

        upsert.assert();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn search_maps_payloads_back_to_chunks() {
        let server = MockServer::start_async().await;
        mock_existing_collection(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/query")
                    .json_body_partial(r#"{"limit":2}"#);
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            {
                                "id": "c-1",
                                "score": 0.9,
                                "payload": { "text": "hello", "metadata": { "title": "Guide" } }
                            },
                            { "id": "c-2", "score": 0.5, "payload": { "metadata": {} } }
                        ]
                    }
                }));
            })
            .await;

        let results = index(&server, 4, 4).search("hello", 2).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c-1");
        assert_eq!(results[0].chunk.metadata_text(TITLE_KEY), Some("Guide"));
        assert!((results[0].retrieval_score - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn mismatched_embedding_dimension_is_rejected() {
        let server = MockServer::start_async().await;
        mock_existing_collection(&server).await;

        let error = index(&server, 8, 4)
            .search("hello", 2)
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }
}
