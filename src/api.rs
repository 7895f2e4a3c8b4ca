//! HTTP surface of the DB service.
//!
//! Every route lives under `/db-service`:
//!
//! - `GET /` – Liveness check returning `{"status": "Hello world!"}`.
//! - `POST /upload` – Index a list of document chunks into the user's index (`{id, content}`).
//! - `GET /delete` – Remove every chunk of a document (`{id, filename}`).
//! - `GET /search` – Neural search over the user's index (`{id, query}`).
//! - `GET /get-documents` – List the filenames stored in the user's index (`{id}`).
//! - `GET /health` – Readiness of the embedding model; `503` until it is deployed.
//! - `GET /metrics` – Per-operation success and error counters.
//!
//! Request bodies are JSON even on `GET` routes. Validation failures and OpenSearch failures
//! both answer `400` with `{"error": message}`.

mod validation;

use crate::metrics::MetricsSnapshot;
use crate::service::{GatewayApi, GatewayError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use validation::parse_payload;

/// Path prefix shared by every route.
pub const ROUTE_PREFIX: &str = "/db-service";

/// Build the HTTP router exposing the gateway API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: GatewayApi + 'static,
{
    let routes = Router::new()
        .route("/", get(hello))
        .route("/upload", post(upload::<S>))
        .route("/delete", get(delete_document::<S>))
        .route("/search", get(search::<S>))
        .route("/get-documents", get(get_documents::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service);

    Router::new()
        .route(&format!("{ROUTE_PREFIX}/"), get(hello))
        .nest(ROUTE_PREFIX, routes)
        .layer(CorsLayer::permissive())
}

async fn hello() -> Json<Value> {
    Json(json!({ "status": "Hello world!" }))
}

/// Request body for `POST /upload`.
#[derive(Deserialize)]
struct UploadRequest {
    /// User id, used as the index name.
    id: String,
    /// Chunk documents (`id`, `text`, `filename`, ...).
    content: Vec<Value>,
}

/// Index the uploaded chunks, creating the user's index on first use.
async fn upload<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Json<Value>, ApiError>
where
    S: GatewayApi,
{
    let request: UploadRequest = parse_payload(&body, &["id", "content"])?;
    let summary = service
        .upload(&request.id, request.content)
        .await
        .map_err(|err| ApiError::from_gateway("Failed to upload data", err))?;
    tracing::info!(
        index = request.id,
        indexed = summary.indexed,
        batches = summary.batches,
        "Upload request completed"
    );
    Ok(Json(json!({ "status": "Data uploaded successfully" })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    id: String,
    filename: String,
}

async fn delete_document<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    S: GatewayApi,
{
    let request: DeleteRequest = parse_payload(&body, &["id", "filename"])?;
    service
        .delete_document(&request.id, &request.filename)
        .await
        .map_err(|err| ApiError::from_gateway("Failed to delete document", err))?;
    Ok(Json(json!({ "status": "Document deleted successfully" })))
}

#[derive(Deserialize)]
struct SearchRequest {
    id: String,
    query: String,
}

/// Return the raw hits of the neural query, embeddings excluded.
async fn search<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Json<Value>, ApiError>
where
    S: GatewayApi,
{
    let request: SearchRequest = parse_payload(&body, &["id", "query"])?;
    let hits = service
        .search(&request.id, &request.query)
        .await
        .map_err(|err| {
            ApiError::from_gateway("Error occurred while performing semantic search", err)
        })?;
    Ok(Json(Value::Array(hits)))
}

#[derive(Deserialize)]
struct DocumentsRequest {
    id: String,
}

async fn get_documents<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    S: GatewayApi,
{
    let request: DocumentsRequest = parse_payload(&body, &["id"])?;
    let documents = service.list_documents(&request.id).await.map_err(|err| {
        ApiError::from_gateway(
            format!(
                "Error occurred while getting documents from index {}",
                request.id
            ),
            err,
        )
    })?;
    Ok(Json(json!({ "documents": documents })))
}

async fn health<S>(State(service): State<Arc<S>>) -> Response
where
    S: GatewayApi,
{
    let readiness = service.readiness().await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let mut body = json!({
        "status": if readiness.ready { "ready" } else { "not_ready" },
        "model_id": readiness.model_id,
        "model_state": readiness.model_state,
    });
    if let Some(error) = readiness.error {
        body["error"] = Value::String(error);
    }
    (status, Json(body)).into_response()
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: GatewayApi,
{
    Json(service.metrics_snapshot())
}

/// Client-facing error rendered as `{"error": message}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Input problems are reported verbatim; backend failures are logged and replaced by
    /// the route's generic `fallback` message.
    fn from_gateway(fallback: impl Into<String>, err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidIndex(_) | GatewayError::InvalidChunk(_) => {
                Self::bad_request(err.to_string())
            }
            GatewayError::IndexNotFound(_) => Self::bad_request("User does not have an index"),
            GatewayError::OpenSearch(_) | GatewayError::Template(_) => {
                let fallback = fallback.into();
                tracing::error!(error = %err, "{fallback}");
                Self::bad_request(fallback)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::{MetricsSnapshot, OutcomeCounts};
    use crate::opensearch::{BulkSummary, ModelState, OpenSearchError};
    use crate::service::{GatewayApi, GatewayError, Readiness};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use reqwest::StatusCode as UpstreamStatus;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Upload { index: String, chunks: usize },
        Delete { index: String, filename: String },
        Search { index: String, query: String },
        List { index: String },
    }

    #[derive(Default)]
    struct StubGateway {
        calls: Mutex<Vec<Call>>,
        missing_index: bool,
        upstream_down: bool,
        deployed: bool,
    }

    impl StubGateway {
        async fn recorded_calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }

        fn upstream(&self) -> Result<(), GatewayError> {
            if self.upstream_down {
                return Err(GatewayError::OpenSearch(OpenSearchError::UnexpectedStatus {
                    status: UpstreamStatus::SERVICE_UNAVAILABLE,
                    body: "down".into(),
                }));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GatewayApi for StubGateway {
        async fn upload(
            &self,
            index: &str,
            content: Vec<Value>,
        ) -> Result<BulkSummary, GatewayError> {
            self.calls.lock().await.push(Call::Upload {
                index: index.into(),
                chunks: content.len(),
            });
            self.upstream()?;
            Ok(BulkSummary {
                indexed: content.len(),
                batches: 1,
            })
        }

        async fn delete_document(&self, index: &str, filename: &str) -> Result<u64, GatewayError> {
            self.calls.lock().await.push(Call::Delete {
                index: index.into(),
                filename: filename.into(),
            });
            if self.missing_index {
                return Err(GatewayError::IndexNotFound(index.into()));
            }
            Ok(2)
        }

        async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>, GatewayError> {
            self.calls.lock().await.push(Call::Search {
                index: index.into(),
                query: query.into(),
            });
            self.upstream()?;
            Ok(vec![
                json!({ "id": "c1", "text": "ownership rules", "filename": "rust.pdf" }),
            ])
        }

        async fn list_documents(&self, index: &str) -> Result<Vec<String>, GatewayError> {
            self.calls.lock().await.push(Call::List {
                index: index.into(),
            });
            Ok(vec!["a.pdf".into(), "b.pdf".into()])
        }

        async fn readiness(&self) -> Readiness {
            Readiness {
                ready: self.deployed,
                model_id: "model-1".into(),
                model_state: Some(if self.deployed {
                    ModelState::Deployed
                } else {
                    ModelState::Deploying
                }),
                error: None,
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                uploads: OutcomeCounts {
                    success: 4,
                    error: 1,
                },
                ..MetricsSnapshot::default()
            }
        }
    }

    async fn send(
        service: Arc<StubGateway>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
        create_router(service)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .expect("request"),
            )
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
    async fn root_route_answers_hello_with_and_without_trailing_slash() {
        for uri in ["/db-service", "/db-service/"] {
            let response = send(Arc::new(StubGateway::default()), Method::GET, uri, None).await;

            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(json_body(response).await, json!({ "status": "Hello world!" }));
        }
    }

    #[tokio::test]
    async fn upload_forwards_chunks_to_the_user_index() {
        let service = Arc::new(StubGateway::default());
        let payload = json!({
            "id": "user-1",
            "content": [
                { "id": "c1", "text": "first", "filename": "a.pdf" },
                { "id": "c2", "text": "second", "filename": "a.pdf" }
            ]
        });

        let response = send(service.clone(), Method::POST, "/db-service/upload", Some(payload)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "Data uploaded successfully" })
        );
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Upload {
                index: "user-1".into(),
                chunks: 2
            }]
        );
    }

    #[tokio::test]
    async fn upload_without_content_is_rejected_before_the_service() {
        let service = Arc::new(StubGateway::default());

        let response = send(
            service.clone(),
            Method::POST,
            "/db-service/upload",
            Some(json!({ "id": "user-1" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Missing required field(s): ['content']" })
        );
        assert!(service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn missing_body_is_rejected() {
        let response = send(
            Arc::new(StubGateway::default()),
            Method::GET,
            "/db-service/search",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "No JSON payload provided" })
        );
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_route_message() {
        let service = Arc::new(StubGateway {
            upstream_down: true,
            ..StubGateway::default()
        });

        let response = send(
            service,
            Method::POST,
            "/db-service/upload",
            Some(json!({ "id": "user-1", "content": [{ "id": "c1" }] })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Failed to upload data" })
        );
    }

    #[tokio::test]
    async fn delete_on_unknown_index_reports_missing_index() {
        let service = Arc::new(StubGateway {
            missing_index: true,
            ..StubGateway::default()
        });

        let response = send(
            service,
            Method::GET,
            "/db-service/delete",
            Some(json!({ "id": "user-1", "filename": "a.pdf" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "User does not have an index" })
        );
    }

    #[tokio::test]
    async fn search_returns_hit_sources() {
        let service = Arc::new(StubGateway::default());

        let response = send(
            service.clone(),
            Method::GET,
            "/db-service/search",
            Some(json!({ "id": "user-1", "query": "borrow checker" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["filename"], "rust.pdf");
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Search {
                index: "user-1".into(),
                query: "borrow checker".into()
            }]
        );
    }

    #[tokio::test]
    async fn get_documents_wraps_filenames() {
        let response = send(
            Arc::new(StubGateway::default()),
            Method::GET,
            "/db-service/get-documents",
            Some(json!({ "id": "user-1" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "documents": ["a.pdf", "b.pdf"] })
        );
    }

    #[tokio::test]
    async fn health_is_unavailable_until_model_is_deployed() {
        let pending = send(
            Arc::new(StubGateway::default()),
            Method::GET,
            "/db-service/health",
            None,
        )
        .await;
        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(pending).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["model_state"], "DEPLOYING");

        let ready = send(
            Arc::new(StubGateway {
                deployed: true,
                ..StubGateway::default()
            }),
            Method::GET,
            "/db-service/health",
            None,
        )
        .await;
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let response = send(
            Arc::new(StubGateway::default()),
            Method::GET,
            "/db-service/metrics",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["uploads"], json!({ "success": 4, "error": 1 }));
        assert_eq!(body["searches"]["success"], 0);
    }
}
