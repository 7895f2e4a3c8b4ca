//! HTTP client wrapper for the OpenSearch REST and ML Commons APIs.

use crate::config::get_config;
use crate::opensearch::types::{
    BulkResponse, BulkSummary, DeleteByQueryResponse, ModelRecord, ModelSource, OpenSearchError,
    SearchHit, SearchResponse, TaskStatus,
};
use futures_util::{StreamExt, stream};
use reqwest::{Client, Method, StatusCode, header::CONTENT_TYPE};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::time::Duration;

const BULK_BATCH_SIZE: usize = 10;
const BULK_CONCURRENCY: usize = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DOCUMENT_SCAN_LIMIT: usize = 10_000;
const ML_LOOKUP_PAGE_SIZE: usize = 100;

/// Format under which pretrained models are registered.
pub const MODEL_FORMAT: &str = "TORCH_SCRIPT";

/// Lightweight HTTP client for OpenSearch operations.
pub struct OpenSearchService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) credentials: Option<(String, String)>,
}

impl OpenSearchService {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, OpenSearchError> {
        let config = get_config();
        let credentials = config
            .opensearch_password
            .as_ref()
            .map(|password| (config.opensearch_username.clone(), password.clone()));
        Self::connect(
            &config.opensearch_url(),
            credentials,
            config.opensearch_verify_certs,
        )
    }

    /// Construct a client for an explicit endpoint.
    ///
    /// `credentials` is a `(username, password)` pair sent as basic auth on every request.
    /// Certificate verification is disabled when `verify_certs` is false, which matches the
    /// self-signed demo certificates shipped with OpenSearch.
    pub fn connect(
        url: &str,
        credentials: Option<(String, String)>,
        verify_certs: bool,
    ) -> Result<Self, OpenSearchError> {
        let client = Client::builder()
            .user_agent("db-service/0.2")
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!verify_certs)
            .build()?;

        let base_url = normalize_base_url(url).map_err(OpenSearchError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            authenticated = credentials.is_some(),
            verify_certs,
            "Initialized OpenSearch HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Apply a cluster settings document.
    pub async fn update_cluster_settings(&self, settings: &Value) -> Result<Value, OpenSearchError> {
        tracing::info!("Updating ML-related cluster settings");
        self.perform(Method::PUT, "_cluster/settings", &[], Some(settings))
            .await
    }

    /// Look up a model group by exact name.
    ///
    /// The phrase query narrows the candidates; only a hit whose `name` is identical counts.
    pub async fn find_model_group_id(
        &self,
        group_name: &str,
    ) -> Result<Option<String>, OpenSearchError> {
        tracing::info!(group_name, "Looking up model group");
        let body = json!({
            "size": ML_LOOKUP_PAGE_SIZE,
            "query": {
                "match_phrase": {
                    "name": group_name
                }
            }
        });
        let hits = self
            .search_hits(Method::GET, "_plugins/_ml/model_groups/_search", &body)
            .await?;

        Ok(hits
            .into_iter()
            .find(|hit| hit.source.get("name").and_then(Value::as_str) == Some(group_name))
            .map(|hit| hit.id))
    }

    /// Register a model group and return its identifier.
    pub async fn create_model_group(
        &self,
        group_name: &str,
        description: &str,
        access_mode: &str,
    ) -> Result<String, OpenSearchError> {
        tracing::info!(group_name, access_mode, "Registering model group");
        let endpoint = "_plugins/_ml/model_groups/_register";
        let body = json!({
            "name": group_name,
            "description": description,
            "access_mode": access_mode,
        });
        let response = self.perform(Method::POST, endpoint, &[], Some(&body)).await?;
        string_field(&response, "model_group_id", endpoint)
    }

    /// Find a model by name inside a model group.
    ///
    /// Model chunk documents share the parent's name and group, so they are excluded in the
    /// query; any that still come back are skipped.
    pub async fn find_model(
        &self,
        model_name: &str,
        group_id: &str,
    ) -> Result<Option<ModelRecord>, OpenSearchError> {
        let body = json!({
            "size": ML_LOOKUP_PAGE_SIZE,
            "query": {
                "bool": {
                    "must": [
                        { "match_phrase": { "name": model_name } },
                        { "match": { "model_group_id": group_id } }
                    ],
                    "must_not": [
                        { "exists": { "field": "chunk_number" } }
                    ]
                }
            }
        });
        let hits = self
            .search_hits(Method::POST, "_plugins/_ml/models/_search", &body)
            .await?;

        for hit in hits {
            let source: ModelSource = serde_json::from_value(Value::Object(hit.source))?;
            if source.chunk_number.is_some() {
                continue;
            }
            if source
                .name
                .as_deref()
                .is_some_and(|name| name != model_name)
            {
                continue;
            }
            return Ok(Some(ModelRecord {
                id: hit.id,
                name: source.name,
                state: source.model_state,
            }));
        }

        Ok(None)
    }

    /// Fetch a model by identifier.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelRecord, OpenSearchError> {
        let response = self
            .perform(
                Method::GET,
                &format!("_plugins/_ml/models/{model_id}"),
                &[],
                None,
            )
            .await?;
        let source: ModelSource = serde_json::from_value(response)?;
        Ok(ModelRecord {
            id: model_id.to_string(),
            name: source.name,
            state: source.model_state,
        })
    }

    /// Submit a model registration and return the asynchronous task identifier.
    pub async fn register_model(
        &self,
        model_name: &str,
        version: &str,
        group_id: &str,
    ) -> Result<String, OpenSearchError> {
        tracing::info!(model_name, version, group_id, "Registering model");
        let endpoint = "_plugins/_ml/models/_register";
        let body = json!({
            "name": model_name,
            "version": version,
            "model_group_id": group_id,
            "model_format": MODEL_FORMAT,
        });
        let response = self.perform(Method::POST, endpoint, &[], Some(&body)).await?;
        string_field(&response, "task_id", endpoint)
    }

    /// Fetch the status of an ML Commons task.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskStatus, OpenSearchError> {
        let response = self
            .perform(
                Method::GET,
                &format!("_plugins/_ml/tasks/{task_id}"),
                &[],
                None,
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Ask OpenSearch to deploy a registered model. Completion is not awaited.
    pub async fn deploy_model(&self, model_id: &str) -> Result<Value, OpenSearchError> {
        tracing::info!(model_id, "Deploying model");
        self.perform(
            Method::POST,
            &format!("_plugins/_ml/models/{model_id}/_deploy"),
            &[],
            Some(&json!({})),
        )
        .await
    }

    /// Create or overwrite an ingest pipeline computing text embeddings with `model_id`.
    pub async fn create_ingest_pipeline(
        &self,
        pipeline_id: &str,
        description: &str,
        model_id: &str,
    ) -> Result<Value, OpenSearchError> {
        tracing::info!(pipeline_id, model_id, "Creating ingest pipeline");
        let body = text_embedding_pipeline(description, model_id);
        self.perform(
            Method::PUT,
            &format!("_ingest/pipeline/{pipeline_id}"),
            &[],
            Some(&body),
        )
        .await
    }

    /// Check whether an index exists.
    pub async fn index_exists(&self, index: &str) -> Result<bool, OpenSearchError> {
        let response = self.request(Method::HEAD, index).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = OpenSearchError::UnexpectedStatus { status, body };
                tracing::error!(index, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    /// Create an index from a rendered index definition.
    pub async fn create_index(&self, index: &str, definition: &Value) -> Result<(), OpenSearchError> {
        tracing::info!(index, "Creating k-NN index");
        self.perform(Method::PUT, index, &[], Some(definition))
            .await?;
        Ok(())
    }

    /// Index documents through the bulk API.
    ///
    /// Documents are sent in batches of ten with up to four requests in flight. A document's
    /// `id` field, when present, becomes its `_id`.
    pub async fn bulk_index(
        &self,
        index: &str,
        documents: &[Map<String, Value>],
    ) -> Result<BulkSummary, OpenSearchError> {
        if documents.is_empty() {
            return Ok(BulkSummary::default());
        }

        let payloads = documents
            .chunks(BULK_BATCH_SIZE)
            .map(|batch| bulk_payload(index, batch))
            .collect::<Result<Vec<_>, _>>()?;
        let batches = payloads.len();
        let total = documents.len();

        let results: Vec<Result<usize, OpenSearchError>> = stream::iter(payloads)
            .map(|payload| self.send_bulk(payload))
            .buffer_unordered(BULK_CONCURRENCY)
            .collect()
            .await;

        let mut indexed = 0;
        let mut failed = 0;
        for result in results {
            match result {
                Ok(count) => indexed += count,
                Err(OpenSearchError::BulkRejected {
                    failed: rejected,
                    total: submitted,
                }) => {
                    failed += rejected;
                    indexed += submitted - rejected;
                }
                Err(error) => return Err(error),
            }
        }

        if failed > 0 {
            let error = OpenSearchError::BulkRejected { failed, total };
            tracing::error!(index, error = %error, "Bulk ingestion incomplete");
            return Err(error);
        }

        tracing::info!(index, indexed, batches, "Bulk ingestion completed");
        Ok(BulkSummary { indexed, batches })
    }

    /// Run a neural query against the `embedding` field and return the raw hits.
    pub async fn neural_search(
        &self,
        index: &str,
        query_text: &str,
        model_id: &str,
        k: usize,
    ) -> Result<Vec<Value>, OpenSearchError> {
        tracing::info!(index, query_text, k, "Semantic search");
        let body = json!({
            "size": k,
            "query": {
                "neural": {
                    "embedding": {
                        "query_text": query_text,
                        "model_id": model_id,
                        "k": k
                    }
                }
            }
        });
        let endpoint = format!("{index}/_search");
        let response = self
            .perform(
                Method::POST,
                &endpoint,
                &[("_source_excludes", "embedding")],
                Some(&body),
            )
            .await?;

        response
            .get("hits")
            .and_then(|hits| hits.get("hits"))
            .and_then(Value::as_array)
            .cloned()
            .ok_or(OpenSearchError::MissingField {
                endpoint,
                field: "hits",
            })
    }

    /// Return the sorted, distinct `filename` values stored in an index.
    pub async fn list_filenames(&self, index: &str) -> Result<Vec<String>, OpenSearchError> {
        tracing::info!(index, "Listing documents");
        let body = json!({
            "size": DOCUMENT_SCAN_LIMIT,
            "query": { "match_all": {} }
        });
        let response = self
            .perform(
                Method::POST,
                &format!("{index}/_search"),
                &[("_source_includes", "filename")],
                Some(&body),
            )
            .await?;
        let SearchResponse { hits } = serde_json::from_value(response)?;

        let filenames: BTreeSet<String> = hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                hit.source
                    .get("filename")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        Ok(filenames.into_iter().collect())
    }

    /// Delete every chunk of a document identified by its `filename`.
    pub async fn delete_by_filename(
        &self,
        index: &str,
        filename: &str,
    ) -> Result<u64, OpenSearchError> {
        tracing::info!(index, filename, "Deleting document");
        let body = json!({
            "query": {
                "term": {
                    "filename": filename
                }
            }
        });
        let response = self
            .perform(
                Method::POST,
                &format!("{index}/_delete_by_query"),
                &[],
                Some(&body),
            )
            .await?;
        let DeleteByQueryResponse { deleted } = serde_json::from_value(response)?;
        Ok(deleted)
    }

    async fn search_hits(
        &self,
        method: Method,
        endpoint: &str,
        body: &Value,
    ) -> Result<Vec<SearchHit>, OpenSearchError> {
        match self.perform(method, endpoint, &[], Some(body)).await {
            Ok(response) => {
                let SearchResponse { hits } = serde_json::from_value(response)?;
                Ok(hits.hits)
            }
            // ML system indices do not exist until the first group or model is stored.
            Err(OpenSearchError::UnexpectedStatus {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    async fn send_bulk(&self, payload: String) -> Result<usize, OpenSearchError> {
        let method = Method::POST;
        let endpoint = "_bulk";
        tracing::info!(method = %method, endpoint, "OpenSearch request");
        let response = self
            .request(method.clone(), endpoint)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .inspect_err(|error| {
                tracing::error!(method = %method, endpoint, error = %error, "OpenSearch request failed");
            })?;
        let value = self.read_response(&method, endpoint, response).await?;
        let bulk: BulkResponse = serde_json::from_value(value)?;

        let total = bulk.items.len();
        if bulk.errors {
            let failed = bulk.items.iter().filter(|item| item_failed(item)).count();
            if failed > 0 {
                return Err(OpenSearchError::BulkRejected { failed, total });
            }
        }
        Ok(total)
    }

    async fn perform(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, OpenSearchError> {
        tracing::info!(method = %method, endpoint, "OpenSearch request");
        let mut request = self.request(method.clone(), endpoint);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            tracing::debug!(endpoint, body = %body, "OpenSearch request body");
            request = request.json(body);
        }

        let response = request.send().await.inspect_err(|error| {
            tracing::error!(method = %method, endpoint, error = %error, "OpenSearch request failed");
        })?;
        self.read_response(&method, endpoint, response).await
    }

    async fn read_response(
        &self,
        method: &Method,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Value, OpenSearchError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = OpenSearchError::UnexpectedStatus { status, body: text };
            tracing::error!(method = %method, endpoint, error = %error, "OpenSearch request failed");
            return Err(error);
        }

        tracing::debug!(endpoint, status = %status, response = %text, "OpenSearch response");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let request = self.client.request(method, url);
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }
}

/// Body of an ingest pipeline with a single `text_embedding` processor (`text` → `embedding`).
pub fn text_embedding_pipeline(description: &str, model_id: &str) -> Value {
    json!({
        "description": description,
        "processors": [
            {
                "text_embedding": {
                    "model_id": model_id,
                    "field_map": {
                        "text": "embedding"
                    }
                }
            }
        ]
    })
}

fn bulk_payload(index: &str, documents: &[Map<String, Value>]) -> Result<String, serde_json::Error> {
    let mut payload = String::new();
    for document in documents {
        let mut action = Map::new();
        if let Some(id) = document.get("id").and_then(document_id) {
            action.insert("_id".into(), Value::String(id));
        }
        action.insert("_index".into(), Value::String(index.to_string()));
        payload.push_str(&serde_json::to_string(&json!({ "index": action }))?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(document)?);
        payload.push('\n');
    }
    Ok(payload)
}

fn document_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn item_failed(item: &Map<String, Value>) -> bool {
    item.values()
        .any(|result| result.get("error").is_some_and(|error| !error.is_null()))
}

fn string_field(
    response: &Value,
    field: &'static str,
    endpoint: &str,
) -> Result<String, OpenSearchError> {
    response
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OpenSearchError::MissingField {
            endpoint: endpoint.to_string(),
            field,
        })
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
