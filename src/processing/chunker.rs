//! Document chunker: normalization, metadata extraction, and token-bounded splitting.

use crate::model::{
    CHUNK_INDEX_KEY, CODE_BLOCK_COUNT_KEY, Chunk, Document, FILENAME_KEY, HEADERS_KEY, Metadata,
    SOURCE_KEY, TITLE_KEY,
};
use uuid::Uuid;

use super::{
    chunking::{TokenCounter, build_token_counter, split_text},
    markdown::{extract_metadata, file_name, normalize, title_from_file_name},
    types::{ChunkerSettings, ChunkingError},
};

/// Turns raw documents into metadata-rich, size-bounded chunks.
///
/// Construction validates the settings and resolves the tokenizer once; [`MarkdownChunker::chunk`]
/// itself accepts any input without failing.
#[derive(Clone)]
pub struct MarkdownChunker {
    settings: ChunkerSettings,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for MarkdownChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownChunker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MarkdownChunker {
    /// Build a chunker, rejecting a zero chunk size or an unloadable tokenizer.
    pub fn new(settings: ChunkerSettings) -> Result<Self, ChunkingError> {
        if settings.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let token_counter = build_token_counter(settings.tokenizer.as_deref())?;
        Ok(Self {
            settings,
            token_counter,
        })
    }

    /// Active settings.
    pub fn settings(&self) -> &ChunkerSettings {
        &self.settings
    }

    /// Split a document into chunks that all carry the same file-level metadata.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let metadata = self.file_metadata(document);
        let normalized = normalize(&document.text);

        let texts = if normalized.is_empty() {
            if self.settings.emit_empty {
                vec![String::new()]
            } else {
                Vec::new()
            }
        } else {
            split_text(
                &normalized,
                self.settings.chunk_size,
                self.settings.overlap,
                &self.token_counter,
            )
        };

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert(CHUNK_INDEX_KEY.into(), index.into());
                Chunk::new(chunk_id(document.id.as_deref(), index), text, chunk_metadata)
            })
            .collect();

        tracing::debug!(
            origin = %document.origin,
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            "Document chunked"
        );
        chunks
    }

    fn file_metadata(&self, document: &Document) -> Metadata {
        let extracted = extract_metadata(&document.text);
        let name = file_name(&document.origin);
        let title = extracted
            .title
            .or_else(|| {
                document
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|title| !title.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| title_from_file_name(name));

        let mut metadata = document.metadata.clone();
        metadata
            .entry(SOURCE_KEY.into())
            .or_insert_with(|| document.origin.clone().into());
        metadata
            .entry(FILENAME_KEY.into())
            .or_insert_with(|| name.into());
        metadata.insert(TITLE_KEY.into(), title.into());
        metadata.insert(HEADERS_KEY.into(), extracted.headers.into());
        metadata.insert(
            CODE_BLOCK_COUNT_KEY.into(),
            extracted.code_block_count.into(),
        );
        metadata
    }
}

/// Deterministic id for chunks of identified documents, random otherwise.
fn chunk_id(document_id: Option<&str>, index: usize) -> String {
    let id = match document_id {
        Some(id) => Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{id}#{index}").as_bytes()),
        None => Uuid::new_v4(),
    };
    id.to_string()
}
