//! Deterministic reranking of retrieved chunks by keyword overlap and retrieval origin.

use crate::model::{RETRIEVAL_ORIGIN_KEY, ScoredChunk};
use std::collections::{BTreeMap, BTreeSet};

/// Origin tag the query orchestrator attaches to chunks returned by the vector index.
pub const VECTOR_STORE_ORIGIN: &str = "vector_store";

const DEFAULT_STOP_WORDS: [&str; 9] = [
    "the", "and", "for", "with", "that", "this", "what", "which", "how",
];

/// Weights and keyword rules applied by the [`Reranker`].
#[derive(Debug, Clone, PartialEq)]
pub struct RerankerConfig {
    /// Weight of the keyword score in the composite.
    pub keyword_weight: f64,
    /// Weight of the source score in the composite.
    pub source_weight: f64,
    /// Lower-cased query tokens that never count as keywords.
    pub stop_words: BTreeSet<String>,
    /// Tokens of this many characters or fewer are discarded.
    pub min_keyword_length: usize,
    /// Source score for each known retrieval origin.
    pub origin_weights: BTreeMap<String, f64>,
    /// Score used when a keyword set is empty or a chunk has no known origin.
    pub neutral_score: f64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            source_weight: 0.5,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|word| word.to_string()).collect(),
            min_keyword_length: 3,
            origin_weights: BTreeMap::from([(VECTOR_STORE_ORIGIN.to_string(), 0.7)]),
            neutral_score: 0.5,
        }
    }
}

/// Scores chunks against a query and orders them by descending composite score.
#[derive(Debug, Clone, Default)]
pub struct Reranker {
    config: RerankerConfig,
}

impl Reranker {
    /// Build a reranker from explicit weights.
    pub fn new(config: RerankerConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &RerankerConfig {
        &self.config
    }

    /// Reorder `chunks` by composite score, highest first.
    ///
    /// The sort is stable, so chunks with equal scores keep their incoming order. Each returned
    /// chunk has its `rerank_score` set.
    pub fn rerank(&self, chunks: Vec<ScoredChunk>, query: &str) -> Vec<ScoredChunk> {
        if chunks.is_empty() {
            return chunks;
        }

        let keywords = self.extract_keywords(query);
        let mut reranked: Vec<ScoredChunk> = chunks
            .into_iter()
            .map(|mut scored| {
                let keyword_score = self.keyword_score(&scored.chunk.text, &keywords);
                let source_score = self.source_score(&scored);
                scored.rerank_score = keyword_score * self.config.keyword_weight
                    + source_score * self.config.source_weight;
                scored
            })
            .collect();

        reranked.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));

        tracing::debug!(
            candidates = reranked.len(),
            keywords = keywords.len(),
            "Reranked chunks"
        );
        reranked
    }

    /// Distinct lower-cased query tokens, in first-seen order, minus stop words and short tokens.
    pub fn extract_keywords(&self, query: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        query
            .to_lowercase()
            .split_whitespace()
            .filter(|token| token.chars().count() > self.config.min_keyword_length)
            .filter(|token| !self.config.stop_words.contains(*token))
            .filter(|token| seen.insert(token.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Fraction of `keywords` that occur in `text` (case-insensitive substring match).
    pub fn keyword_score(&self, text: &str, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return self.config.neutral_score;
        }
        let text = text.to_lowercase();
        let matches = keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count();
        matches as f64 / keywords.len() as f64
    }

    /// Weight of the chunk's declared retrieval origin, neutral when unknown or absent.
    pub fn source_score(&self, scored: &ScoredChunk) -> f64 {
        scored
            .chunk
            .metadata_text(RETRIEVAL_ORIGIN_KEY)
            .and_then(|origin| self.config.origin_weights.get(origin))
            .copied()
            .unwrap_or(self.config.neutral_score)
    }
}
