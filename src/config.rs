//! Environment-driven configuration.
//!
//! Every setting is read from the process environment (a `.env` file is honoured at start-up).
//! [`Config::from_lookup`] accepts any key lookup so tests can build configurations without
//! touching process state. Pipeline components never read the global directly; they receive the
//! projections exposed here ([`Config::chunker_settings`], [`Config::reranker_config`],
//! [`Config::query_settings`]).

use crate::processing::ChunkerSettings;
use crate::query::QuerySettings;
use crate::rerank::RerankerConfig;
use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Rusty RAG server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which vector index backs retrieval.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime (embeddings and chat).
    pub ollama_url: String,
    /// Chat model used to generate answers.
    pub chat_model: String,
    /// Optional sampling temperature forwarded to the chat model.
    pub chat_temperature: Option<f32>,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Optional tiktoken model or encoding name; whitespace counting when absent.
    pub text_splitter_tokenizer: Option<String>,
    /// Emit one empty chunk for documents with no text instead of none.
    pub text_splitter_emit_empty: bool,
    /// File extensions (lower-case, without dot) eligible for folder ingestion.
    pub document_extensions: Vec<String>,
    /// Weight applied to the keyword score during reranking.
    pub rerank_keyword_weight: f64,
    /// Weight applied to the source score during reranking.
    pub rerank_source_weight: f64,
    /// Optional replacement for the default stop-word list.
    pub rerank_stop_words: Option<BTreeSet<String>>,
    /// Query tokens with this many characters or fewer are ignored.
    pub rerank_min_keyword_length: usize,
    /// Result count used when a query does not provide one.
    pub query_default_top_k: usize,
    /// Upper bound for the per-query result count.
    pub query_max_top_k: usize,
    /// Candidates retrieved per requested result before reranking.
    pub retrieval_width_multiplier: usize,
    /// Optional cap on the characters of each source excerpt in responses.
    pub source_excerpt_chars: Option<usize>,
    /// Folder of Markdown notes used for start-up ingestion.
    pub knowledgebase_folder: Option<String>,
    /// Ingest `knowledgebase_folder` before serving.
    pub knowledgebase_init: bool,
    /// Base URL of the Confluence instance.
    pub confluence_url: Option<String>,
    /// Confluence space keys to ingest.
    pub confluence_spaces: Vec<String>,
    /// Page size requested from the Confluence content API.
    pub confluence_page_limit: usize,
    /// Upper bound on page-listing requests per space.
    pub confluence_max_pages: usize,
    /// Ingest `confluence_spaces` before serving.
    pub confluence_scrape: bool,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreKind {
    /// Remote Qdrant collection.
    Qdrant,
    /// Process-local index, lost on exit.
    Memory,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing embeddings for offline runs.
    Hash,
}

impl FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" | "in-memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let config = Self {
            vector_store: vars.parse_or("VECTOR_STORE", VectorStoreKind::Qdrant)?,
            qdrant_url: vars.string_or("QDRANT_URL", "http://127.0.0.1:6333"),
            qdrant_collection_name: vars.string_or("QDRANT_COLLECTION_NAME", "rusty-rag"),
            qdrant_api_key: vars.get("QDRANT_API_KEY"),
            embedding_provider: vars.parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?,
            embedding_model: vars.string_or("EMBEDDING_MODEL", "nomic-embed-text"),
            embedding_dimension: vars.parse_or("EMBEDDING_DIMENSION", 768)?,
            ollama_url: vars.string_or("OLLAMA_URL", "http://127.0.0.1:11434"),
            chat_model: vars.string_or("CHAT_MODEL", "llama3.2"),
            chat_temperature: vars.parse_optional("CHAT_TEMPERATURE")?,
            request_timeout: Duration::from_secs(vars.parse_or("REQUEST_TIMEOUT_SECS", 120)?),
            text_splitter_chunk_size: vars.parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: vars.parse_or("TEXT_SPLITTER_CHUNK_OVERLAP", 32)?,
            text_splitter_tokenizer: vars.get("TEXT_SPLITTER_TOKENIZER"),
            text_splitter_emit_empty: vars.flag("TEXT_SPLITTER_EMIT_EMPTY")?,
            document_extensions: vars
                .list("DOCUMENT_EXTENSIONS")
                .map(|items| {
                    items
                        .into_iter()
                        .map(|ext| ext.trim_start_matches('.').to_lowercase())
                        .collect()
                })
                .unwrap_or_else(|| vec!["md".into(), "markdown".into()]),
            rerank_keyword_weight: vars.parse_or("RERANK_KEYWORD_WEIGHT", 0.5)?,
            rerank_source_weight: vars.parse_or("RERANK_SOURCE_WEIGHT", 0.5)?,
            rerank_stop_words: vars.list("RERANK_STOP_WORDS").map(|words| {
                words
                    .into_iter()
                    .map(|word| word.to_lowercase())
                    .collect()
            }),
            rerank_min_keyword_length: vars.parse_or("RERANK_MIN_KEYWORD_LENGTH", 3)?,
            query_default_top_k: vars.positive_or("QUERY_DEFAULT_TOP_K", 10)?,
            query_max_top_k: vars.positive_or("QUERY_MAX_TOP_K", 50)?,
            retrieval_width_multiplier: vars.positive_or("RETRIEVAL_WIDTH_MULTIPLIER", 1)?,
            source_excerpt_chars: vars.parse_optional("SOURCE_EXCERPT_CHARS")?,
            knowledgebase_folder: vars.get("KNOWLEDGEBASE_FOLDER"),
            knowledgebase_init: vars.flag("KNOWLEDGEBASE_INIT")?,
            confluence_url: vars.get("CONFLUENCE_URL"),
            confluence_spaces: vars.list("CONFLUENCE_SPACES").unwrap_or_default(),
            confluence_page_limit: vars.positive_or("CONFLUENCE_PAGE_LIMIT", 10)?,
            confluence_max_pages: vars.positive_or("CONFLUENCE_MAX_PAGES", 500)?,
            confluence_scrape: vars.flag("CONFLUENCE_SCRAPE")?,
            server_port: vars.parse_optional("SERVER_PORT")?,
        };

        if config.knowledgebase_init && config.knowledgebase_folder.is_none() {
            return Err(ConfigError::MissingVariable("KNOWLEDGEBASE_FOLDER".into()));
        }
        if config.confluence_scrape && config.confluence_url.is_none() {
            return Err(ConfigError::MissingVariable("CONFLUENCE_URL".into()));
        }
        Ok(config)
    }

    /// Chunker settings derived from the splitter and embedding configuration.
    pub fn chunker_settings(&self) -> ChunkerSettings {
        ChunkerSettings {
            chunk_size: crate::processing::chunking::determine_chunk_size(
                self.text_splitter_chunk_size,
                self.embedding_provider,
                &self.embedding_model,
            ),
            overlap: self.text_splitter_chunk_overlap,
            tokenizer: self.text_splitter_tokenizer.clone(),
            emit_empty: self.text_splitter_emit_empty,
        }
    }

    /// Reranker weights and keyword rules.
    pub fn reranker_config(&self) -> RerankerConfig {
        let mut config = RerankerConfig {
            keyword_weight: self.rerank_keyword_weight,
            source_weight: self.rerank_source_weight,
            min_keyword_length: self.rerank_min_keyword_length,
            ..RerankerConfig::default()
        };
        if let Some(stop_words) = &self.rerank_stop_words {
            config.stop_words = stop_words.clone();
        }
        config
    }

    /// Query orchestration settings.
    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            max_top_k: self.query_max_top_k,
            retrieval_width_multiplier: self.retrieval_width_multiplier,
            source_excerpt_chars: self.source_excerpt_chars,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn positive_or(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.parse_or(key, default)? {
            0 => Err(ConfigError::InvalidValue(key.to_string())),
            value => Ok(value),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key).map(|value| value.to_lowercase()) {
            None => Ok(false),
            Some(value) => match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue(key.to_string())),
            },
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .get(key)?
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        if items.is_empty() { None } else { Some(items) }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        vector_store = ?config.vector_store,
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chat_model = %config.chat_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
