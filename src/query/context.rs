//! Context assembly and prompt construction.

use crate::model::{Chunk, Source};

/// Context used when retrieval leaves no chunks.
pub const FALLBACK_CONTEXT: &str = "No relevant information found.";

const SYSTEM_PROMPT_PREFIX: &str = "You are an AI assistant that helps answer questions based on the provided context.\n\
Use the following pieces of context to answer the question at the end.\n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
Context:\n";

const SYSTEM_PROMPT_SUFFIX: &str =
    "\n\nAnswer the question in a comprehensive and informative way.";

const EXCERPT_MARKER: &str = "...";

/// System and user portions of a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Fixed instructions with the assembled context embedded.
    pub system: String,
    /// The literal question.
    pub user: String,
}

/// Join chunk texts in order, separated by a blank line, or return the fallback sentence.
pub fn assemble_context(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return FALLBACK_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Embed `context` in the system instructions and pair it with the question.
pub fn build_prompt(context: &str, question: &str) -> Prompt {
    Prompt {
        system: format!("{SYSTEM_PROMPT_PREFIX}{context}{SYSTEM_PROMPT_SUFFIX}"),
        user: question.to_string(),
    }
}

/// Cited source for a chunk; text longer than `max_chars` is cut and marked with `...`.
pub fn to_source(chunk: &Chunk, max_chars: Option<usize>) -> Source {
    Source {
        content: excerpt(&chunk.text, max_chars),
        metadata: chunk.metadata.clone(),
    }
}

fn excerpt(text: &str, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(limit) if text.chars().count() > limit => {
            let cut: String = text.chars().take(limit).collect();
            format!("{cut}{EXCERPT_MARKER}")
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, TITLE_KEY};

    fn chunk(text: &str) -> Chunk {
        Chunk::new("id", text, Metadata::new())
    }

    #[test]
    fn context_joins_chunks_with_blank_lines() {
        let context = assemble_context(&[chunk("first"), chunk("second")]);
        assert_eq!(context, "first\n\nsecond");
    }

    #[test]
    fn empty_selection_uses_fallback() {
        assert_eq!(assemble_context(&[]), FALLBACK_CONTEXT);
    }

    #[test]
    fn prompt_embeds_context_and_keeps_question_literal() {
        let prompt = build_prompt("ctx body", "  What is Rust? ");
        assert!(prompt.system.starts_with("You are an AI assistant"));
        assert!(prompt.system.contains("Context:\nctx body\n\nAnswer the question"));
        assert_eq!(prompt.user, "  What is Rust? ");
    }

    #[test]
    fn sources_are_cut_on_character_boundaries() {
        let mut metadata = Metadata::new();
        metadata.insert(TITLE_KEY.into(), "Guide".into());
        let chunk = Chunk::new("id", "héllo wörld", metadata.clone());

        assert_eq!(to_source(&chunk, None).content, "héllo wörld");
        assert_eq!(to_source(&chunk, Some(50)).content, "héllo wörld");
        let cut = to_source(&chunk, Some(4));
        assert_eq!(cut.content, "héll...");
        assert_eq!(cut.metadata, metadata);
    }
}
