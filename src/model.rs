//! Domain types shared by ingestion, retrieval, and answer generation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key naming the origin of a document or chunk.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the bare file name of the origin.
pub const FILENAME_KEY: &str = "filename";
/// Metadata key holding the document title.
pub const TITLE_KEY: &str = "title";
/// Metadata key holding every heading in document order.
pub const HEADERS_KEY: &str = "headers";
/// Metadata key holding the number of fenced code blocks.
pub const CODE_BLOCK_COUNT_KEY: &str = "code_block_count";
/// Metadata key holding the position of a chunk within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key tagging which index returned a chunk.
pub const RETRIEVAL_ORIGIN_KEY: &str = "retrieval_origin";

/// A single metadata value. Values stay flat so any vector store can persist them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Free-form text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Fractional number.
    Float(f64),
    /// Ordered list of strings.
    List(Vec<String>),
}

impl MetadataValue {
    /// Borrow the value as text when it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Return the value as an integer when it is a whole number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow the value as a list when it is one.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Metadata attached to documents and chunks, ordered by key.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Raw document produced by a content source and consumed by the chunker.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Stable identifier assigned by the source, if it has one.
    pub id: Option<String>,
    /// Origin path or URL.
    pub origin: String,
    /// Title known to the source (e.g. a Confluence page title).
    pub title: Option<String>,
    /// Full document text.
    pub text: String,
    /// Source-level metadata copied onto every chunk.
    pub metadata: Metadata,
}

impl Document {
    /// Build a document with no identifier, title, or extra metadata.
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            origin: origin.into(),
            title: None,
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a source identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a known title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach a source-level metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Bounded excerpt of one document plus its metadata; the unit stored in and returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Stable chunk identifier (UUID).
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Metadata copied from the document plus chunk-specific fields.
    pub metadata: Metadata,
}

impl Chunk {
    /// Build a chunk from parts.
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Read a textual metadata entry.
    pub fn metadata_text(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_text)
    }
}

/// Chunk returned by a similarity search, with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Retrieved chunk.
    pub chunk: Chunk,
    /// Similarity reported by the vector index.
    pub retrieval_score: f32,
    /// Composite relevance computed by the reranker (zero until reranked).
    pub rerank_score: f64,
}

impl ScoredChunk {
    /// Wrap a retrieved chunk with its similarity score.
    pub fn new(chunk: Chunk, retrieval_score: f32) -> Self {
        Self {
            chunk,
            retrieval_score,
            rerank_score: 0.0,
        }
    }
}

/// Question plus the number of sources to ground the answer on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Natural-language question.
    pub text: String,
    /// Maximum number of chunks used as context.
    pub top_k: usize,
}

impl Query {
    /// Result count applied when the caller does not provide one.
    pub const DEFAULT_TOP_K: usize = 10;

    /// Build a query with an explicit result count.
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
        }
    }
}

/// One cited source in a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// Chunk text or a bounded excerpt of it.
    pub content: String,
    /// Chunk metadata.
    pub metadata: Metadata,
}

/// Generated answer with the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Answer text returned by the generation model.
    pub answer: String,
    /// Number of cited sources.
    pub sources_count: usize,
    /// Sources in final ranked order.
    pub sources: Vec<Source>,
}
