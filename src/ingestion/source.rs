//! Content source capability and the result of scanning a source.

use crate::model::Document;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a source from being scanned at all.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Folder root does not exist or is not a directory.
    #[error("source folder not found: {0}")]
    NotFound(PathBuf),
    /// Source location failed to parse.
    #[error("invalid source URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote API responded with an unexpected status code.
    #[error("unexpected response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Body associated with the failing response.
        body: String,
    },
    /// Background scan task failed to complete.
    #[error("source scan aborted: {0}")]
    Aborted(String),
}

/// Document that was found but could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    /// Path or URL of the document.
    pub origin: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Everything a source produced in one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScan {
    /// Readable, eligible documents in deterministic order.
    pub documents: Vec<Document>,
    /// Items ignored because they are not eligible (e.g. wrong file extension).
    pub ineligible: usize,
    /// Eligible items that failed to load.
    pub skipped: Vec<SkippedDocument>,
}

/// Yields raw documents for ingestion.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short human-readable description used in logs.
    fn describe(&self) -> String;

    /// Enumerate every eligible document. Individual unreadable items are reported in
    /// [`SourceScan::skipped`]; an `Err` means the source as a whole was unavailable.
    async fn fetch(&self) -> Result<SourceScan, SourceError>;
}
