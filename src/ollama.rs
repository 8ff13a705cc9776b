//! Shared construction of `ollama-rs` clients.

use ollama_rs::Ollama;
use reqwest::{Client, Url};
use std::time::Duration;

const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Build an Ollama client for `base_url` whose HTTP requests are bounded by `timeout`.
///
/// `Ollama::new` takes host and port separately, so the URL is split here.
pub(crate) fn build_client(base_url: &str, timeout: Duration) -> Result<Ollama, String> {
    let (host_url, port) = split_base_url(base_url)?;

    let http = Client::builder()
        .user_agent("rusty-rag/0.1")
        .timeout(timeout)
        .build()
        .map_err(|error| format!("failed to build HTTP client: {error}"))?;

    tracing::debug!(host = %host_url, port, "Initialized Ollama client");
    Ok(Ollama::new_with_client(host_url, port, http))
}

/// Host URL (scheme, host and any path prefix) plus the effective port.
///
/// A URL without a port uses its scheme's default (`https` is 443); the Ollama port applies only
/// when the scheme has no known default.
fn split_base_url(base_url: &str) -> Result<(String, u16), String> {
    let parsed = Url::parse(base_url).map_err(|error| format!("invalid Ollama URL: {error}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| format!("Ollama URL has no host: {base_url}"))?;
    let port = parsed.port_or_known_default().unwrap_or(DEFAULT_OLLAMA_PORT);
    let prefix = parsed.path().trim_end_matches('/');
    let host_url = if prefix.is_empty() {
        format!("{}://{}", parsed.scheme(), host)
    } else {
        format!("{}://{}{}/", parsed.scheme(), host, prefix)
    };
    Ok((host_url, port))
}
