//! Confluence spaces as a content source, paged through the REST content API.

use super::source::{ContentSource, SkippedDocument, SourceError, SourceScan};
use crate::model::{Document, SOURCE_KEY, TITLE_KEY};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashSet, time::Duration};

const CONFLUENCE_SOURCE: &str = "confluence";
const SPACE_KEY: &str = "space";
const PAGE_ID_KEY: &str = "page_id";

/// Pages of one or more Confluence spaces, read through the REST content API.
pub struct ConfluenceSource {
    client: Client,
    base_url: String,
    spaces: Vec<String>,
    page_limit: usize,
    max_pages: usize,
}

#[derive(Debug, Deserialize)]
struct ContentPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default, rename = "_links")]
    links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    next: Option<String>,
    base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    id: String,
    #[serde(default)]
    title: String,
    body: Option<ContentBody>,
    #[serde(default, rename = "_links")]
    links: ItemLinks,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    view: Option<BodyView>,
}

#[derive(Debug, Deserialize)]
struct BodyView {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ItemLinks {
    webui: Option<String>,
}

impl ConfluenceSource {
    /// Build a source for `spaces` on the Confluence instance at `base_url`.
    ///
    /// `page_limit` is the page size requested per call; `max_pages` bounds the number of
    /// listing requests per space.
    pub fn new(
        base_url: &str,
        spaces: Vec<String>,
        page_limit: usize,
        max_pages: usize,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let parsed = Url::parse(base_url).map_err(|error| SourceError::InvalidUrl(error.to_string()))?;
        let client = Client::builder()
            .user_agent("rusty-rag/confluence")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            spaces,
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        })
    }

    fn first_page_url(&self, space: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&format!("{}/rest/api/content", self.base_url))
            .map_err(|error| SourceError::InvalidUrl(error.to_string()))?;
        url.query_pairs_mut()
            .append_pair("type", "page")
            .append_pair("spaceKey", space)
            .append_pair("limit", &self.page_limit.to_string())
            .append_pair("expand", "body.view");
        Ok(url)
    }

    /// Resolve a `_links.next` reference; relative links hang off `_links.base` when present.
    fn resolve_next(&self, next: Option<&str>, base: Option<&str>) -> Option<String> {
        let next = next.map(str::trim).filter(|next| !next.is_empty())?;
        if Url::parse(next).is_ok() {
            return Some(next.to_string());
        }
        let base = base
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .unwrap_or(&self.base_url)
            .trim_end_matches('/');
        let separator = if next.starts_with('/') { "" } else { "/" };
        Some(format!("{base}{separator}{next}"))
    }

    fn to_document(&self, space: &str, item: ContentItem) -> Result<Document, SkippedDocument> {
        let origin = match item.links.webui.as_deref() {
            Some(webui) if !webui.is_empty() => format!("{}{webui}", self.base_url),
            _ => format!("{}/pages/{}", self.base_url, item.id),
        };
        let html = item
            .body
            .and_then(|body| body.view)
            .map(|view| view.value)
            .unwrap_or_default();
        let text = htmd::convert(&html).map_err(|error| SkippedDocument {
            origin: origin.clone(),
            reason: format!("failed to convert page body: {error}"),
        })?;

        Ok(Document::new(origin, text)
            .with_id(item.id.clone())
            .with_title(item.title.clone())
            .with_metadata(SOURCE_KEY, CONFLUENCE_SOURCE)
            .with_metadata(SPACE_KEY, space)
            .with_metadata(PAGE_ID_KEY, item.id)
            .with_metadata(TITLE_KEY, item.title))
    }

    async fn fetch_page(&self, url: &str) -> Result<ContentPage, SourceError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::UnexpectedStatus { status, body });
        }
        Ok(response.json().await?)
    }

    async fn scan_space(&self, space: &str, scan: &mut SourceScan) -> Result<(), SourceError> {
        let mut next = Some(self.first_page_url(space)?.to_string());
        let mut visited = HashSet::new();
        let mut requests = 0;

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::warn!(space, url = %url, "Confluence pagination revisited a page; stopping");
                break;
            }
            if requests >= self.max_pages {
                tracing::warn!(space, max_pages = self.max_pages, "Confluence page limit reached");
                break;
            }
            requests += 1;

            let page = match self.fetch_page(&url).await {
                Ok(page) => page,
                Err(error) => {
                    tracing::warn!(space, url = %url, error = %error, "Failed to fetch Confluence page listing");
                    scan.skipped.push(SkippedDocument {
                        origin: url,
                        reason: error.to_string(),
                    });
                    break;
                }
            };

            tracing::debug!(space, items = page.results.len(), "Fetched Confluence listing");
            for (position, raw) in page.results.into_iter().enumerate() {
                let item = match serde_json::from_value::<ContentItem>(raw) {
                    Ok(item) => item,
                    Err(error) => {
                        tracing::warn!(space, url = %url, position, error = %error, "Skipping malformed Confluence item");
                        scan.skipped.push(SkippedDocument {
                            origin: format!("{url}#{position}"),
                            reason: format!("malformed page item: {error}"),
                        });
                        continue;
                    }
                };
                match self.to_document(space, item) {
                    Ok(document) => scan.documents.push(document),
                    Err(skipped) => {
                        tracing::warn!(origin = %skipped.origin, reason = %skipped.reason, "Skipping Confluence page");
                        scan.skipped.push(skipped);
                    }
                }
            }

            next = self.resolve_next(page.links.next.as_deref(), page.links.base.as_deref());
        }

        Ok(())
    }
}

#[async_trait]
impl ContentSource for ConfluenceSource {
    fn describe(&self) -> String {
        format!("confluence {} [{}]", self.base_url, self.spaces.join(","))
    }

    async fn fetch(&self) -> Result<SourceScan, SourceError> {
        let mut scan = SourceScan::default();
        for space in &self.spaces {
            self.scan_space(space, &mut scan).await?;
            tracing::info!(space = %space, documents = scan.documents.len(), "Scanned Confluence space");
        }
        Ok(scan)
    }
}
