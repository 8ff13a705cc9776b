//! Answer generation through a chat-capable language model.
//!
//! The gateway receives the assembled system prompt and the user's question and returns the
//! model's reply verbatim. The Ollama-backed gateway talks to `/api/chat` directly.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider could not be constructed or reached.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// A language model that answers a question under a system instruction.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Submit the `[system, user]` message pair and return the answer text.
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// Chat gateway backed by a local Ollama runtime.
pub struct OllamaChatGateway {
    http: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaChatGateway {
    /// Build a gateway for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: Option<f32>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("rusty-rag/chat")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Build the gateway described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        Self::new(
            config.ollama_url.clone(),
            config.chat_model.clone(),
            config.chat_temperature,
            config.request_timeout,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default = "default_done")]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

const fn default_done() -> bool {
    true
}

#[async_trait]
impl GenerationGateway for OllamaChatGateway {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
        });
        if let Some(temperature) = self.temperature {
            payload["options"] = json!({ "temperature": temperature });
        }

        tracing::debug!(model = %self.model, "Requesting chat completion");
        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content)
    }
}
