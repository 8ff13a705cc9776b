//! HTTP surface for the RAG service.
//!
//! - `POST /api/rag/query?topK=N` answers `{ "query": "..." }` with
//!   `{ answer, sourcesCount, sources: [{ content, metadata }] }`.
//! - `POST /api/rag/ingest/folder` ingests the configured knowledge-base folder, or a
//!   `{ "path": "..." }` inside it, and returns the ingestion report. Paths resolving outside the
//!   folder are rejected with 403.
//! - `POST /api/rag/ingest/confluence` ingests `{ "spaces": [...] }` (or the configured spaces).
//! - `GET /metrics` reports ingestion and query counters.
//! - `GET /health` is a liveness check.

use crate::ingestion::{IngestionReport, SourceError};
use crate::metrics::MetricsSnapshot;
use crate::model::QueryResponse;
use crate::query::QueryError;
use crate::service::{RagApi, ServiceError};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};

/// Build the HTTP router for `service`.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/api/rag/query", post(query::<S>))
        .route("/api/rag/ingest/folder", post(ingest_folder::<S>))
        .route("/api/rag/ingest/confluence", post(ingest_confluence::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Deserialize)]
struct QueryParams {
    #[serde(rename = "topK")]
    top_k: Option<usize>,
}

async fn query<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<QueryParams>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    let response = service.query(request.query, params.top_k).await?;
    tracing::info!(sources = response.sources_count, "Query request completed");
    Ok(Json(response))
}

#[derive(Deserialize, Default)]
struct FolderRequest {
    #[serde(default)]
    path: Option<PathBuf>,
}

async fn ingest_folder<S>(
    State(service): State<Arc<S>>,
    request: Option<Json<FolderRequest>>,
) -> Result<Json<IngestionReport>, AppError>
where
    S: RagApi,
{
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let report = service.ingest_folder(request.path).await?;
    Ok(Json(report))
}

#[derive(Deserialize, Default)]
struct ConfluenceRequest {
    #[serde(default)]
    spaces: Option<Vec<String>>,
}

async fn ingest_confluence<S>(
    State(service): State<Arc<S>>,
    request: Option<Json<ConfluenceRequest>>,
) -> Result<Json<IngestionReport>, AppError>
where
    S: RagApi,
{
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let report = service.ingest_confluence(request.spaces).await?;
    Ok(Json(report))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

async fn health() -> &'static str {
    "ok"
}

struct AppError(ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Query(QueryError::InvalidQuery(_)) | ServiceError::NotConfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PathOutsideKnowledgebase(_) => StatusCode::FORBIDDEN,
            ServiceError::Source(SourceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Query(_) | ServiceError::Ingestion(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::generation::GenerationError;
    use crate::ingestion::IngestionReport;
    use crate::metrics::MetricsSnapshot;
    use crate::model::{Metadata, QueryResponse, Source};
    use crate::query::QueryError;
    use crate::service::{RagApi, RagService, ServiceError};
    use crate::{
        embedding::HashEmbeddingClient,
        generation::GenerationGateway,
        index::{InMemoryVectorIndex, VectorIndex},
        ingestion::IngestionPipeline,
        processing::{ChunkerSettings, MarkdownChunker},
        query::{QueryService, QuerySettings},
        rerank::Reranker,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::{path::PathBuf, sync::Arc};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Query(String, Option<usize>),
        Folder(Option<PathBuf>),
        Confluence(Option<Vec<String>>),
    }

    #[derive(Default)]
    struct StubRagService {
        calls: Mutex<Vec<Call>>,
    }

    impl StubRagService {
        async fn recorded_calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn query(
            &self,
            text: String,
            top_k: Option<usize>,
        ) -> Result<QueryResponse, ServiceError> {
            self.calls.lock().await.push(Call::Query(text.clone(), top_k));
            match text.as_str() {
                "" => Err(ServiceError::Query(QueryError::InvalidQuery("blank".into()))),
                "down" => Err(ServiceError::Query(QueryError::Generation(
                    GenerationError::ProviderUnavailable("offline".into()),
                ))),
                _ => Ok(QueryResponse {
                    answer: "stub answer".into(),
                    sources_count: 1,
                    sources: vec![Source {
                        content: "chunk text".into(),
                        metadata: Metadata::from([("title".to_string(), "Guide".into())]),
                    }],
                }),
            }
        }

        async fn ingest_folder(
            &self,
            path: Option<PathBuf>,
        ) -> Result<IngestionReport, ServiceError> {
            self.calls.lock().await.push(Call::Folder(path));
            Ok(IngestionReport {
                documents_found: 2,
                chunks_stored: 5,
                ..IngestionReport::default()
            })
        }

        async fn ingest_confluence(
            &self,
            spaces: Option<Vec<String>>,
        ) -> Result<IngestionReport, ServiceError> {
            self.calls.lock().await.push(Call::Confluence(spaces));
            Err(ServiceError::NotConfigured("CONFLUENCE_URL unset".into()))
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 3,
                chunks_indexed: 9,
                queries_answered: 1,
                last_chunk_size: None,
            }
        }
    }

    async fn send(
        service: Arc<StubRagService>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        create_router(service)
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn query_route_passes_top_k_and_returns_camel_case() {
        let service = Arc::new(StubRagService::default());
        let response = send(
            service.clone(),
            Method::POST,
            "/api/rag/query?topK=3",
            Some(json!({ "query": "What is Rust?" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["answer"], "stub answer");
        assert_eq!(json["sourcesCount"], 1);
        assert_eq!(json["sources"][0]["content"], "chunk text");
        assert_eq!(json["sources"][0]["metadata"]["title"], "Guide");

        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Query("What is Rust?".into(), Some(3))]
        );
    }

    #[tokio::test]
    async fn query_without_top_k_uses_service_default() {
        let service = Arc::new(StubRagService::default());
        let response = send(
            service.clone(),
            Method::POST,
            "/api/rag/query",
            Some(json!({ "query": "hello" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Query("hello".into(), None)]
        );
    }

    #[tokio::test]
    async fn invalid_query_is_bad_request_and_collaborator_failure_is_bad_gateway() {
        let service = Arc::new(StubRagService::default());
        let invalid = send(
            service.clone(),
            Method::POST,
            "/api/rag/query",
            Some(json!({ "query": "" })),
        )
        .await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let failed = send(
            service,
            Method::POST,
            "/api/rag/query",
            Some(json!({ "query": "down" })),
        )
        .await;
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn folder_route_accepts_path_or_empty_body() {
        let service = Arc::new(StubRagService::default());
        let response = send(
            service.clone(),
            Method::POST,
            "/api/rag/ingest/folder",
            Some(json!({ "path": "/data/kb" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["documentsFound"], 2);
        assert_eq!(json["chunksStored"], 5);

        let response = send(service.clone(), Method::POST, "/api/rag/ingest/folder", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            service.recorded_calls().await,
            vec![
                Call::Folder(Some(PathBuf::from("/data/kb"))),
                Call::Folder(None)
            ]
        );
    }

    fn knowledgebase_service(folder: &std::path::Path) -> Arc<RagService> {
        struct SilentGenerator;

        #[async_trait]
        impl GenerationGateway for SilentGenerator {
            async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
                Ok(String::new())
            }
        }

        let index: Arc<dyn VectorIndex> =
            Arc::new(InMemoryVectorIndex::new(Arc::new(HashEmbeddingClient::new(16))));
        let chunker = MarkdownChunker::new(ChunkerSettings::default()).expect("chunker");
        let queries = QueryService::new(
            index.clone(),
            Reranker::default(),
            Arc::new(SilentGenerator),
            QuerySettings::default(),
        );
        Arc::new(
            RagService::new(IngestionPipeline::new(chunker, index), queries, 10)
                .with_knowledgebase_folder(Some(folder.to_path_buf())),
        )
    }

    #[tokio::test]
    async fn folder_route_rejects_paths_outside_the_knowledgebase() {
        let knowledgebase = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        std::fs::write(knowledgebase.path().join("kb.md"), "# KB").expect("write");
        std::fs::write(outside.path().join("private.md"), "# Private").expect("write");
        let service = knowledgebase_service(knowledgebase.path());

        let response = create_router(service.clone())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/rag/ingest/folder")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "path": outside.path() }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(service.metrics_snapshot().documents_ingested, 0);

        let response = create_router(service.clone())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/rag/ingest/folder")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["documentsFound"], 1);
    }

    #[tokio::test]
    async fn unconfigured_confluence_is_bad_request() {
        let service = Arc::new(StubRagService::default());
        let response = send(
            service.clone(),
            Method::POST,
            "/api/rag/ingest/confluence",
            Some(json!({ "spaces": ["ENG"] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Confluence(Some(vec!["ENG".into()]))]
        );
    }

    #[tokio::test]
    async fn metrics_and_health_routes_respond() {
        let service = Arc::new(StubRagService::default());
        let response = send(service.clone(), Method::GET, "/metrics", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["documentsIngested"], 3);
        assert_eq!(json["queriesAnswered"], 1);

        let response = send(service, Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
