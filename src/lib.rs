#![deny(missing_docs)]

//! Core library for Rusty RAG: retrieval-augmented question answering over Markdown notes and
//! Confluence spaces.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
pub mod generation;
pub mod index;
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
pub mod model;
mod ollama;
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
pub mod query;
pub mod rerank;
pub mod service;
