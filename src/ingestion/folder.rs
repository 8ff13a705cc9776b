//! Markdown files beneath a local folder as a content source.

use super::source::{ContentSource, SkippedDocument, SourceError, SourceScan};
use crate::model::Document;
use async_trait::async_trait;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Recursively reads Markdown files beneath a folder.
#[derive(Debug, Clone)]
pub struct MarkdownFolderSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl MarkdownFolderSource {
    /// Read files under `root` whose extension is one of `extensions` (case-insensitive).
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|extension| extension.trim_start_matches('.').to_lowercase())
                .filter(|extension| !extension.is_empty())
                .collect(),
        }
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                let extension = extension.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == extension)
            })
    }

    /// Root-relative path with `/` separators, stable across runs and machines.
    fn document_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn scan(&self) -> Result<SourceScan, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NotFound(self.root.clone()));
        }

        let mut scan = SourceScan::default();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    let origin = error
                        .path()
                        .map_or_else(|| self.root.display().to_string(), |path| path.display().to_string());
                    tracing::warn!(origin = %origin, error = %error, "Skipping unreadable entry");
                    scan.skipped.push(SkippedDocument {
                        origin,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.is_eligible(path) {
                scan.ineligible += 1;
                continue;
            }

            let origin = path.display().to_string();
            match fs::read_to_string(path) {
                Ok(text) => {
                    tracing::debug!(origin = %origin, bytes = text.len(), "Read document");
                    let id = self.document_id(path);
                    scan.documents.push(Document::new(origin, text).with_id(id));
                }
                Err(error) => {
                    tracing::warn!(origin = %origin, error = %error, "Skipping unreadable document");
                    scan.skipped.push(SkippedDocument {
                        origin,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(scan)
    }
}

#[async_trait]
impl ContentSource for MarkdownFolderSource {
    fn describe(&self) -> String {
        format!("folder {}", self.root.display())
    }

    async fn fetch(&self) -> Result<SourceScan, SourceError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|error| SourceError::Aborted(error.to_string()))?
    }
}
