//! Document processing: Markdown normalization, metadata extraction, and chunking.

mod chunker;
pub mod chunking;
pub mod markdown;
pub mod types;

pub use chunker::MarkdownChunker;
pub use types::{ChunkerSettings, ChunkingError};
