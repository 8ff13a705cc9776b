//! Helpers for constructing and reading Qdrant payloads.

use crate::model::{Chunk, Metadata, MetadataValue};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub(crate) const TEXT_FIELD: &str = "text";
pub(crate) const CHUNK_HASH_FIELD: &str = "chunk_hash";
pub(crate) const INDEXED_AT_FIELD: &str = "indexed_at";
pub(crate) const METADATA_FIELD: &str = "metadata";

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    text: &str,
    chunk_hash: &str,
    timestamp_rfc3339: &str,
    metadata: &Metadata,
) -> Value {
    let metadata: Map<String, Value> = metadata
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            )
        })
        .collect();

    let mut payload = Map::new();
    payload.insert(TEXT_FIELD.into(), Value::String(text.to_string()));
    payload.insert(CHUNK_HASH_FIELD.into(), Value::String(chunk_hash.to_string()));
    payload.insert(
        INDEXED_AT_FIELD.into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    payload.insert(METADATA_FIELD.into(), Value::Object(metadata));
    Value::Object(payload)
}

/// Rebuild a chunk from a stored point. Points without a text payload yield `None`.
pub(crate) fn chunk_from_payload(id: String, payload: Option<Map<String, Value>>) -> Option<Chunk> {
    let mut payload = payload?;
    let text = match payload.remove(TEXT_FIELD)? {
        Value::String(text) => text,
        _ => return None,
    };

    let metadata = match payload.remove(METADATA_FIELD) {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(key, value)| {
                serde_json::from_value::<MetadataValue>(value)
                    .ok()
                    .map(|value| (key, value))
            })
            .collect(),
        _ => Metadata::new(),
    };

    Some(Chunk::new(id, text, metadata))
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
