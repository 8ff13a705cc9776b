//! Application service tying ingestion, querying and metrics together.

use crate::{
    config::Config,
    embedding::{EmbeddingClientError, get_embedding_client},
    generation::{GenerationError, OllamaChatGateway},
    index::{IndexError, build_vector_index},
    ingestion::{
        ConfluenceSource, IngestionError, IngestionPipeline, IngestionReport,
        MarkdownFolderSource, SourceError,
    },
    metrics::{MetricsSnapshot, RagMetrics},
    model::{Query, QueryResponse},
    processing::{ChunkingError, MarkdownChunker},
    query::{QueryError, QueryService},
    rerank::Reranker,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;

/// Errors surfaced by [`RagApi`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A requested operation needs configuration that is absent.
    #[error("not configured: {0}")]
    NotConfigured(String),
    /// A requested folder resolves outside the configured knowledge-base folder.
    #[error("{} is outside the knowledge-base folder", .0.display())]
    PathOutsideKnowledgebase(PathBuf),
    /// Query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Ingestion failed.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    /// A content source could not be constructed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Chunker construction failed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Embedding client construction failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index construction failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Generation gateway construction failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Operations exposed over HTTP and the CLI.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Answer a question; `top_k` falls back to the configured default.
    async fn query(&self, text: String, top_k: Option<usize>)
    -> Result<QueryResponse, ServiceError>;

    /// Ingest Markdown files below the configured knowledge-base folder, or below `path` when it
    /// resolves inside that folder. Relative paths are taken from the knowledge-base folder.
    async fn ingest_folder(&self, path: Option<PathBuf>) -> Result<IngestionReport, ServiceError>;

    /// Ingest Confluence `spaces`, or the configured spaces.
    async fn ingest_confluence(
        &self,
        spaces: Option<Vec<String>>,
    ) -> Result<IngestionReport, ServiceError>;

    /// Current activity counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Connection settings for the Confluence source.
#[derive(Debug, Clone)]
pub struct ConfluenceSettings {
    /// Base URL of the Confluence instance.
    pub url: String,
    /// Spaces scraped when a request names none.
    pub spaces: Vec<String>,
    /// Page size requested per listing call.
    pub page_limit: usize,
    /// Listing requests allowed per space.
    pub max_pages: usize,
    /// HTTP timeout.
    pub timeout: Duration,
}

/// Default [`RagApi`] implementation.
pub struct RagService {
    pipeline: IngestionPipeline,
    queries: QueryService,
    metrics: RagMetrics,
    default_top_k: usize,
    document_extensions: Vec<String>,
    knowledgebase_folder: Option<PathBuf>,
    confluence: Option<ConfluenceSettings>,
}

impl RagService {
    /// Assemble the service from already-built parts.
    pub fn new(pipeline: IngestionPipeline, queries: QueryService, default_top_k: usize) -> Self {
        Self {
            pipeline,
            queries,
            metrics: RagMetrics::new(),
            default_top_k,
            document_extensions: vec!["md".into(), "markdown".into()],
            knowledgebase_folder: None,
            confluence: None,
        }
    }

    /// Accept files with these extensions during folder ingestion.
    pub fn with_document_extensions(mut self, extensions: Vec<String>) -> Self {
        self.document_extensions = extensions;
        self
    }

    /// Folder ingested when a request names none.
    pub fn with_knowledgebase_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.knowledgebase_folder = folder;
        self
    }

    /// Enable Confluence ingestion.
    pub fn with_confluence(mut self, settings: Option<ConfluenceSettings>) -> Self {
        self.confluence = settings;
        self
    }

    /// Build every collaborator described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let embedder = get_embedding_client(config)?;
        let index = build_vector_index(config, embedder)?;
        let chunker = MarkdownChunker::new(config.chunker_settings())?;
        let generator = Arc::new(OllamaChatGateway::from_config(config)?);

        let pipeline = IngestionPipeline::new(chunker, index.clone());
        let queries = QueryService::new(
            index,
            Reranker::new(config.reranker_config()),
            generator,
            config.query_settings(),
        );

        let confluence = config.confluence_url.as_ref().map(|url| ConfluenceSettings {
            url: url.clone(),
            spaces: config.confluence_spaces.clone(),
            page_limit: config.confluence_page_limit,
            max_pages: config.confluence_max_pages,
            timeout: config.request_timeout,
        });

        Ok(Self::new(pipeline, queries, config.query_default_top_k)
            .with_document_extensions(config.document_extensions.clone())
            .with_knowledgebase_folder(config.knowledgebase_folder.as_ref().map(PathBuf::from))
            .with_confluence(confluence))
    }

    /// Ingest Markdown files below `root` with no containment check. Used by the CLI, whose
    /// caller already has local file access.
    pub async fn ingest_path(&self, root: PathBuf) -> Result<IngestionReport, ServiceError> {
        let source = MarkdownFolderSource::new(root, &self.document_extensions);
        let report = self.pipeline.ingest(&source).await?;
        self.record(&report);
        Ok(report)
    }

    fn record(&self, report: &IngestionReport) {
        self.metrics.record_ingestion(
            report.documents_found as u64,
            report.chunks_stored as u64,
            self.pipeline.chunk_size() as u64,
        );
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn query(
        &self,
        text: String,
        top_k: Option<usize>,
    ) -> Result<QueryResponse, ServiceError> {
        let query = Query::new(text, top_k.unwrap_or(self.default_top_k));
        let response = self.queries.process(&query).await?;
        self.metrics.record_query();
        Ok(response)
    }

    async fn ingest_folder(&self, path: Option<PathBuf>) -> Result<IngestionReport, ServiceError> {
        let knowledgebase = self.knowledgebase_folder.as_ref().ok_or_else(|| {
            ServiceError::NotConfigured("KNOWLEDGEBASE_FOLDER unset".into())
        })?;
        let root = match path {
            Some(path) => resolve_within(knowledgebase, &path).await?,
            None => knowledgebase.clone(),
        };
        self.ingest_path(root).await
    }

    async fn ingest_confluence(
        &self,
        spaces: Option<Vec<String>>,
    ) -> Result<IngestionReport, ServiceError> {
        let settings = self
            .confluence
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("CONFLUENCE_URL unset".into()))?;
        let spaces = spaces
            .filter(|spaces| !spaces.is_empty())
            .unwrap_or_else(|| settings.spaces.clone());
        if spaces.is_empty() {
            return Err(ServiceError::NotConfigured(
                "no Confluence spaces given or configured".into(),
            ));
        }

        let source = ConfluenceSource::new(
            &settings.url,
            spaces,
            settings.page_limit,
            settings.max_pages,
            settings.timeout,
        )?;
        let report = self.pipeline.ingest(&source).await?;
        self.record(&report);
        Ok(report)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Canonicalize `requested` (relative to `root` when not absolute) and require it to sit under
/// the canonical `root`.
async fn resolve_within(root: &Path, requested: &Path) -> Result<PathBuf, ServiceError> {
    let canonical_root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| SourceError::NotFound(root.to_path_buf()))?;
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        canonical_root.join(requested)
    };
    let canonical = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|_| SourceError::NotFound(requested.to_path_buf()))?;
    if canonical.starts_with(&canonical_root) {
        Ok(canonical)
    } else {
        tracing::warn!(path = %requested.display(), "Rejected folder outside the knowledge base");
        Err(ServiceError::PathOutsideKnowledgebase(requested.to_path_buf()))
    }
}
