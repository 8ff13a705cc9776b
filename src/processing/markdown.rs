//! Markdown normalization and structural metadata extraction.

use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n?").expect("line break pattern"));
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("whitespace pattern"));
static TRAILING_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +\n").expect("trailing space pattern"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));
static TIGHT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})([^\s#])").expect("heading marker pattern"));
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+)$").expect("title pattern"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").expect("heading pattern"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("code fence pattern"));

/// Structural facts read from the original (un-normalized) document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownMetadata {
    /// First level-1 heading, if any.
    pub title: Option<String>,
    /// Every heading text (levels 1-6) in document order, duplicates kept.
    pub headers: Vec<String>,
    /// Number of fenced code blocks.
    pub code_block_count: usize,
}

/// Clean raw Markdown before splitting.
///
/// Line endings become `\n`, runs of horizontal whitespace become one space, three or more
/// newlines become two, and a line-leading heading marker glued to its text gets a space.
pub fn normalize(text: &str) -> String {
    let text = LINE_BREAKS.replace_all(text, "\n");
    let text = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    let text = TRAILING_SPACES.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = TIGHT_HEADING.replace_all(&text, "$1 $2");
    text.trim().to_string()
}

/// Scan Markdown for its title, headings, and fenced code blocks.
pub fn extract_metadata(text: &str) -> MarkdownMetadata {
    let title = TITLE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty());

    let headers = HEADING
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    MarkdownMetadata {
        title,
        headers,
        code_block_count: CODE_FENCE.find_iter(text).count(),
    }
}

/// Last path or URL segment of an origin identifier.
pub fn file_name(origin: &str) -> &str {
    let without_query = origin.split(['?', '#']).next().unwrap_or(origin);
    without_query
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query)
}

/// Human-readable title derived from a file name: extension dropped, `-`/`_` become spaces.
pub fn title_from_file_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    stem.replace(['-', '_'], " ")
}
