//! Settings and error definitions for the chunking pipeline.

use anyhow::Error as TokenizerError;
use thiserror::Error;

/// Errors raised while preparing a chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Tokenizer model or encoding we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Parameters controlling how documents are cut into chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerSettings {
    /// Maximum estimated tokens per chunk.
    pub chunk_size: usize,
    /// Tokens of the previous chunk repeated at the start of the next one.
    pub overlap: usize,
    /// tiktoken model or encoding name; whitespace word counting when `None`.
    pub tokenizer: Option<String>,
    /// Emit a single empty chunk for empty documents instead of none.
    pub emit_empty: bool,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 32,
            tokenizer: None,
            emit_empty: false,
        }
    }
}
