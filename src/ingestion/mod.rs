//! Document ingestion: content sources and the chunk-and-store pipeline.

mod confluence;
mod folder;
mod pipeline;
mod source;

pub use confluence::ConfluenceSource;
pub use folder::MarkdownFolderSource;
pub use pipeline::{IngestionError, IngestionPipeline, IngestionReport};
pub use source::{ContentSource, SkippedDocument, SourceError, SourceScan};
