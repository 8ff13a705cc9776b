//! Query orchestration from question to cited answer.

use super::context::{assemble_context, build_prompt, to_source};
use crate::{
    generation::{GenerationError, GenerationGateway},
    index::{IndexError, VectorIndex},
    model::{Chunk, Query, QueryResponse, RETRIEVAL_ORIGIN_KEY},
    rerank::{Reranker, VECTOR_STORE_ORIGIN},
};
use std::sync::Arc;
use thiserror::Error;

/// Errors that fail a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request itself was unusable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Similarity search failed.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
    /// The generation model failed.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Limits applied by the [`QueryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    /// Requests asking for more sources are clamped to this many.
    pub max_top_k: usize,
    /// Candidates fetched per requested source before reranking.
    pub retrieval_width_multiplier: usize,
    /// Cut source excerpts to this many characters when set.
    pub source_excerpt_chars: Option<usize>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_top_k: 50,
            retrieval_width_multiplier: 1,
            source_excerpt_chars: None,
        }
    }
}

/// Runs a question through retrieval, reranking and generation.
pub struct QueryService {
    index: Arc<dyn VectorIndex>,
    reranker: Reranker,
    generator: Arc<dyn GenerationGateway>,
    settings: QuerySettings,
}

impl QueryService {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        reranker: Reranker,
        generator: Arc<dyn GenerationGateway>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            index,
            reranker,
            generator,
            settings,
        }
    }

    /// Answer `query`, citing the chunks used as context.
    ///
    /// Any retrieval or generation failure fails the whole query.
    pub async fn process(&self, query: &Query) -> Result<QueryResponse, QueryError> {
        if query.text.trim().is_empty() {
            return Err(QueryError::InvalidQuery("query text must not be blank".into()));
        }
        if query.top_k == 0 {
            return Err(QueryError::InvalidQuery("topK must be positive".into()));
        }

        let top_k = query.top_k.min(self.settings.max_top_k.max(1));
        let width = top_k.saturating_mul(self.settings.retrieval_width_multiplier.max(1));

        let mut candidates = self.index.search(&query.text, width).await?;
        tracing::debug!(candidates = candidates.len(), width, "Retrieved candidates");

        for candidate in &mut candidates {
            candidate
                .chunk
                .metadata
                .entry(RETRIEVAL_ORIGIN_KEY.into())
                .or_insert_with(|| VECTOR_STORE_ORIGIN.into());
        }

        let mut ranked = self.reranker.rerank(candidates, &query.text);
        ranked.truncate(top_k);
        let selected: Vec<Chunk> = ranked.into_iter().map(|scored| scored.chunk).collect();

        let context = assemble_context(&selected);
        let prompt = build_prompt(&context, &query.text);
        let answer = self.generator.generate(&prompt.system, &prompt.user).await?;

        let sources: Vec<_> = selected
            .iter()
            .map(|chunk| to_source(chunk, self.settings.source_excerpt_chars))
            .collect();

        tracing::info!(sources = sources.len(), top_k, "Query answered");
        Ok(QueryResponse {
            answer,
            sources_count: sources.len(),
            sources,
        })
    }
}
