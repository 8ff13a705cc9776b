//! Chunk-size heuristics and token-bounded splitting helpers.
//!
//! This module decides how large a chunk may be and cuts normalized text accordingly:
//!
//! - Automatic sizing: derive a budget from the embedding model's context window and clamp to
//!   a conservative range; callers can override via `TEXT_SPLITTER_CHUNK_SIZE`.
//! - Overlap: each chunk after the first is prefixed with the tail of its predecessor
//!   (`TEXT_SPLITTER_CHUNK_OVERLAP` tokens) so spans around a boundary stay visible to retrieval.
//! - Token counting: whitespace-delimited words by default; a `tiktoken-rs` encoding when
//!   `TEXT_SPLITTER_TOKENIZER` names a model or encoding.

use crate::config::EmbeddingProvider;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

/// Shared token-estimation function.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Determine the chunk size, respecting an explicit override.
///
/// An override wins and is clamped at `>= 1`. Otherwise the embedding model's context window is
/// divided by four and clamped into `[256, 1024]`.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(provider, model);
    let base = (window / 4).max(1);
    base.clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

/// Look up the embedding context window for a given provider/model combination.
pub(crate) fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::Ollama => ollama_embedding_context_window(model),
        EmbeddingProvider::Hash => 2048,
    }
}

fn ollama_embedding_context_window(model: &str) -> usize {
    let normalized = model.to_lowercase();
    let base = normalized.split(':').next().unwrap_or_default();
    match base {
        "nomic-embed-text" | "mxbai-embed-large" | "mxbai-embed-large-v1" => 8192,
        value if value.contains("all-minilm") => 512,
        value if value.contains("e5-large") => 4096,
        _ => {
            tracing::trace!(model, "Using default Ollama context window estimate");
            4096
        }
    }
}

/// Build a token counter.
///
/// `None` selects whitespace word counting. A name is resolved as a tiktoken model first, then as
/// an encoding name, and finally falls back to `cl100k_base` with a warning.
pub(crate) fn build_token_counter(tokenizer: Option<&str>) -> Result<TokenCounter, ChunkingError> {
    match tokenizer.map(str::trim).filter(|name| !name.is_empty()) {
        None => Ok(whitespace_token_counter()),
        Some(name) => build_tiktoken_counter(name),
    }
}

fn build_tiktoken_counter(name: &str) -> Result<TokenCounter, ChunkingError> {
    let encoding = resolve_encoding(name).map_err(|source| ChunkingError::Tokenizer {
        model: name.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(name) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                name,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(name) {
                candidate
            } else {
                tracing::warn!(
                    name,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Whitespace word count; non-empty text without words still counts as one token.
pub(crate) fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Split text into token-bounded segments with a sliding overlap.
///
/// - `chunk_size` is a hard upper bound on the token count per segment (must be `> 0`).
/// - `overlap` is clamped to `chunk_size - 1`.
///
/// Returns an empty vector when the input text is all whitespace.
pub(crate) fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, token_counter)
}

/// Prefix each chunk with a token-limited tail of its predecessor.
///
/// The combined chunk is trimmed from the start until it fits `chunk_size` again.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.len() < 2 || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let next = match &previous {
            None => current.clone(),
            Some(prev) => build_overlapped_chunk(
                prev,
                &current,
                effective_overlap,
                chunk_size,
                token_counter,
            ),
        };
        overlapped.push(next);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = tail_with_token_limit(previous, overlap, token_counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_token_budget(&combined, chunk_size, token_counter).to_string()
}

/// Longest suffix of `text` (by char boundary) whose token count fits `token_limit`.
fn tail_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }
    trim_to_token_budget(text, token_limit, token_counter)
}

/// Longest suffix of `text` (starting on a char boundary, leading whitespace dropped) that fits
/// `token_budget`.
///
/// Token counts shrink as the suffix start moves right, so the start is found by binary search
/// over char boundaries.
fn trim_to_token_budget<'a>(
    text: &'a str,
    token_budget: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    let fits = |offset: usize| token_counter.as_ref()(text[offset..].trim_start()) <= token_budget;
    if fits(0) {
        return text.trim_start();
    }

    let boundaries: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    // boundaries[low] does not fit; boundaries[high] fits, with `len` standing for the empty suffix.
    let (mut low, mut high) = (0, boundaries.len());
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if fits(boundaries[mid]) {
            high = mid;
        } else {
            low = mid;
        }
    }

    boundaries
        .get(high)
        .map_or("", |&offset| text[offset..].trim_start())
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
