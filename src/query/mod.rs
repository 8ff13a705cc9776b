//! Query orchestration: retrieval, reranking, context assembly and answer generation.

pub mod context;
mod service;

pub use context::{FALLBACK_CONTEXT, Prompt};
pub use service::{QueryError, QueryService, QuerySettings};
