//! Chunk-and-store pipeline over a content source.

use super::source::{ContentSource, SkippedDocument};
use crate::{
    index::{IndexError, VectorIndex},
    model::Chunk,
    processing::MarkdownChunker,
    qdrant::compute_chunk_hash,
};
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The vector index rejected the chunk batch.
    #[error("failed to store chunks: {0}")]
    Index(#[from] IndexError),
}

/// Counts describing one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Eligible documents read from the source.
    pub documents_found: usize,
    /// Items the source ignored as ineligible.
    pub documents_ineligible: usize,
    /// Chunks produced by the chunker before dedupe.
    pub chunks_produced: usize,
    /// Chunks dropped because an identical text appeared earlier in the batch.
    pub duplicate_chunks: usize,
    /// Chunks written to the index.
    pub chunks_stored: usize,
    /// Documents (or whole sources) skipped, with reasons.
    pub skipped: Vec<SkippedDocument>,
}

/// Reads a source, chunks every document and stores the batch in the vector index.
pub struct IngestionPipeline {
    chunker: MarkdownChunker,
    index: Arc<dyn VectorIndex>,
}

impl IngestionPipeline {
    /// Wire a pipeline from its chunker and target index.
    pub fn new(chunker: MarkdownChunker, index: Arc<dyn VectorIndex>) -> Self {
        Self { chunker, index }
    }

    /// Token bound applied to each chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunker.settings().chunk_size
    }

    /// Ingest everything `source` yields.
    ///
    /// An unavailable source or unreadable document is recorded in the report and never aborts
    /// the run; only a failing index write is returned as an error. Nothing is written when no
    /// chunks were produced.
    pub async fn ingest(&self, source: &dyn ContentSource) -> Result<IngestionReport, IngestionError> {
        let description = source.describe();
        tracing::info!(source = %description, "Starting ingestion");

        let scan = match source.fetch().await {
            Ok(scan) => scan,
            Err(error) => {
                tracing::warn!(source = %description, error = %error, "Content source unavailable");
                return Ok(IngestionReport {
                    skipped: vec![SkippedDocument {
                        origin: description,
                        reason: error.to_string(),
                    }],
                    ..IngestionReport::default()
                });
            }
        };

        let mut report = IngestionReport {
            documents_found: scan.documents.len(),
            documents_ineligible: scan.ineligible,
            skipped: scan.skipped,
            ..IngestionReport::default()
        };

        let chunks: Vec<Chunk> = scan
            .documents
            .iter()
            .flat_map(|document| self.chunker.chunk(document))
            .collect();
        report.chunks_produced = chunks.len();

        let (unique, duplicates) = dedupe_chunks(chunks);
        report.duplicate_chunks = duplicates;

        if unique.is_empty() {
            tracing::info!(source = %description, "No chunks produced; nothing to store");
            return Ok(report);
        }

        report.chunks_stored = self.index.add(unique).await?;
        tracing::info!(
            source = %description,
            documents = report.documents_found,
            ineligible = report.documents_ineligible,
            skipped = report.skipped.len(),
            stored = report.chunks_stored,
            duplicates = report.duplicate_chunks,
            "Ingestion complete"
        );
        Ok(report)
    }
}

/// Drop chunks whose text hash was already seen in this batch, keeping the first occurrence.
fn dedupe_chunks(chunks: Vec<Chunk>) -> (Vec<Chunk>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for chunk in chunks {
        if seen.insert(compute_chunk_hash(&chunk.text)) {
            unique.push(chunk);
        } else {
            skipped += 1;
        }
    }

    (unique, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embedding::HashEmbeddingClient,
        index::InMemoryVectorIndex,
        ingestion::{MarkdownFolderSource, SourceError, SourceScan},
        model::{Document, Metadata, ScoredChunk},
        processing::ChunkerSettings,
    };
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        batches: Mutex<Vec<Vec<Chunk>>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
            let count = chunks.len();
            self.batches.lock().await.push(chunks);
            Ok(count)
        }

        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
            Ok(Vec::new())
        }
    }

    struct StaticSource(Result<SourceScan, String>);

    #[async_trait]
    impl ContentSource for StaticSource {
        fn describe(&self) -> String {
            "static".into()
        }

        async fn fetch(&self) -> Result<SourceScan, SourceError> {
            self.0.clone().map_err(SourceError::Aborted)
        }
    }

    fn pipeline(index: Arc<RecordingIndex>) -> IngestionPipeline {
        let chunker = MarkdownChunker::new(ChunkerSettings {
            chunk_size: 200,
            overlap: 0,
            ..ChunkerSettings::default()
        })
        .expect("chunker");
        IngestionPipeline::new(chunker, index)
    }

    #[tokio::test]
    async fn folder_ingestion_uses_only_eligible_documents() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("one.md"), "# One\n\nFirst document.").expect("write");
        fs::write(dir.path().join("two.md"), "# Two\n\nSecond document.").expect("write");
        fs::write(dir.path().join("skip.txt"), "plain text").expect("write");
        fs::write(dir.path().join("skip.html"), "<p>html</p>").expect("write");
        fs::write(dir.path().join("skip.json"), "{}").expect("write");

        let index = Arc::new(RecordingIndex::default());
        let source = MarkdownFolderSource::new(dir.path(), &["md".to_string()]);
        let report = pipeline(index.clone()).ingest(&source).await.expect("ingest");

        assert_eq!(report.documents_found, 2);
        assert_eq!(report.documents_ineligible, 3);
        assert_eq!(report.chunks_stored, 2);

        let batches = index.batches.lock().await;
        assert_eq!(batches.len(), 1, "one batch insert");
        let titles: Vec<_> = batches[0]
            .iter()
            .map(|chunk| chunk.metadata_text("title").unwrap_or_default().to_string())
            .collect();
        assert_eq!(titles, vec!["One", "Two"]);
        assert!(batches[0].iter().all(|chunk| !chunk.text.contains("plain text")));
    }

    #[tokio::test]
    async fn empty_scan_is_a_no_op() {
        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone())
            .ingest(&StaticSource(Ok(SourceScan {
                documents: vec![Document::new("blank.md", "   ")],
                ..SourceScan::default()
            })))
            .await
            .expect("ingest");

        assert_eq!(report.documents_found, 1);
        assert_eq!(report.chunks_stored, 0);
        assert!(index.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_chunk_texts_are_stored_once() {
        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone())
            .ingest(&StaticSource(Ok(SourceScan {
                documents: vec![
                    Document::new("a.md", "same text").with_metadata("copy", "first"),
                    Document::new("b.md", "same text"),
                    Document::new("c.md", "other text"),
                ],
                ..SourceScan::default()
            })))
            .await
            .expect("ingest");

        assert_eq!(report.chunks_produced, 3);
        assert_eq!(report.duplicate_chunks, 1);
        assert_eq!(report.chunks_stored, 2);
        let batches = index.batches.lock().await;
        assert_eq!(batches[0][0].metadata_text("copy"), Some("first"));
    }

    #[tokio::test]
    async fn unavailable_source_is_reported_not_raised() {
        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone())
            .ingest(&StaticSource(Err("offline".into())))
            .await
            .expect("ingest");

        assert_eq!(report.chunks_stored, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].origin, "static");
        assert!(report.skipped[0].reason.contains("offline"));
        assert!(index.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn reingesting_a_folder_replaces_its_chunks() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("guide.md"), "# Guide\n\nRestart the worker.").expect("write");

        let memory = Arc::new(InMemoryVectorIndex::new(Arc::new(HashEmbeddingClient::new(16))));
        let chunker = MarkdownChunker::new(ChunkerSettings::default()).expect("chunker");
        let pipeline = IngestionPipeline::new(chunker, memory.clone());
        let source = MarkdownFolderSource::new(dir.path(), &["md".to_string()]);

        pipeline.ingest(&source).await.expect("first ingest");
        pipeline.ingest(&source).await.expect("second ingest");

        assert_eq!(memory.len().await, 1);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let chunk = |id: &str, text: &str| Chunk::new(id, text, Metadata::new());
        let (unique, skipped) = dedupe_chunks(vec![
            chunk("1", "a"),
            chunk("2", "b"),
            chunk("3", "a"),
        ]);
        assert_eq!(skipped, 1);
        let ids: Vec<_> = unique.iter().map(|chunk| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
