//! Gateway service translating HTTP requests into OpenSearch calls.

use crate::{
    metrics::{GatewayMetrics, MetricsSnapshot, Operation},
    opensearch::{
        BulkSummary, ModelState, OpenSearchError, OpenSearchService, TemplateError,
        load_json_template,
    },
    provisioning::ProvisioningResult,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

const INVALID_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];
const MAX_INDEX_NAME_BYTES: usize = 255;

/// Errors emitted by the gateway service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// OpenSearch call failed.
    #[error("OpenSearch request failed: {0}")]
    OpenSearch(#[from] OpenSearchError),
    /// Index definition template could not be loaded.
    #[error("Failed to load index template: {0}")]
    Template(#[from] TemplateError),
    /// User id cannot be used as an OpenSearch index name.
    #[error("Invalid index name {0:?}")]
    InvalidIndex(String),
    /// Operation requires an index that does not exist.
    #[error("Index {0:?} does not exist")]
    IndexNotFound(String),
    /// Uploaded content item is not a JSON object.
    #[error("Content item {0} is not a JSON object")]
    InvalidChunk(usize),
}

/// Readiness of the embedding model for ingestion and search.
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    /// Whether the provisioned model is deployed.
    pub ready: bool,
    /// Provisioned model id.
    pub model_id: String,
    /// Model state reported by OpenSearch, when reachable.
    pub model_state: Option<ModelState>,
    /// Diagnostic captured when the state could not be read.
    pub error: Option<String>,
}

/// Abstraction over the gateway operations used by the HTTP surface.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Index document chunks into the user's index, creating the index when missing.
    async fn upload(&self, index: &str, content: Vec<Value>) -> Result<BulkSummary, GatewayError>;

    /// Delete every chunk of `filename` from the user's index.
    async fn delete_document(&self, index: &str, filename: &str) -> Result<u64, GatewayError>;

    /// Run a neural search over the user's index.
    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>, GatewayError>;

    /// List the filenames stored in the user's index, creating the index when missing.
    async fn list_documents(&self, index: &str) -> Result<Vec<String>, GatewayError>;

    /// Report whether the embedding model is deployed.
    async fn readiness(&self) -> Readiness;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Request-serving side of the gateway.
///
/// Built once provisioning has finished; the provisioned model and pipeline ids are passed in
/// explicitly and never change afterwards.
pub struct GatewayService {
    opensearch: OpenSearchService,
    provisioning: ProvisioningResult,
    index_template_path: PathBuf,
    search_top_k: usize,
    metrics: GatewayMetrics,
}

impl GatewayService {
    /// Build the service from a connected client and the provisioning outcome.
    pub fn new(
        opensearch: OpenSearchService,
        provisioning: ProvisioningResult,
        index_template_path: PathBuf,
        search_top_k: usize,
    ) -> Self {
        Self {
            opensearch,
            provisioning,
            index_template_path,
            search_top_k,
            metrics: GatewayMetrics::new(),
        }
    }

    /// Create the user's k-NN index from the template unless it already exists.
    ///
    /// Returns whether the index was created by this call.
    pub async fn ensure_index(&self, index: &str) -> Result<bool, GatewayError> {
        validate_index_name(index)?;
        if self.opensearch.index_exists(index).await? {
            return Ok(false);
        }

        let definition = load_json_template(
            &self.index_template_path,
            &[("pipeline", self.provisioning.pipeline_id.as_str())],
        )
        .await?;

        match self.opensearch.create_index(index, &definition).await {
            Ok(()) => Ok(true),
            Err(OpenSearchError::UnexpectedStatus { status, body })
                if status == StatusCode::BAD_REQUEST
                    && body.contains("resource_already_exists_exception") =>
            {
                tracing::debug!(index, "Index created concurrently");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn upload_inner(
        &self,
        index: &str,
        content: Vec<Value>,
    ) -> Result<BulkSummary, GatewayError> {
        let documents = content
            .into_iter()
            .enumerate()
            .map(|(position, item)| match item {
                Value::Object(map) => Ok(map),
                _ => Err(GatewayError::InvalidChunk(position)),
            })
            .collect::<Result<Vec<Map<String, Value>>, _>>()?;

        self.ensure_index(index).await?;
        Ok(self.opensearch.bulk_index(index, &documents).await?)
    }

    async fn delete_inner(&self, index: &str, filename: &str) -> Result<u64, GatewayError> {
        validate_index_name(index)?;
        if !self.opensearch.index_exists(index).await? {
            return Err(GatewayError::IndexNotFound(index.to_string()));
        }
        Ok(self.opensearch.delete_by_filename(index, filename).await?)
    }

    async fn search_inner(&self, index: &str, query: &str) -> Result<Vec<Value>, GatewayError> {
        validate_index_name(index)?;
        Ok(self
            .opensearch
            .neural_search(
                index,
                query,
                &self.provisioning.model_id,
                self.search_top_k,
            )
            .await?)
    }

    fn record<T>(&self, operation: Operation, result: &Result<T, GatewayError>) {
        self.metrics.record(operation, result.is_ok());
    }
}

#[async_trait]
impl GatewayApi for GatewayService {
    async fn upload(&self, index: &str, content: Vec<Value>) -> Result<BulkSummary, GatewayError> {
        tracing::info!(index, chunks = content.len(), "Uploading content");
        let result = self.upload_inner(index, content).await;
        self.record(Operation::Upload, &result);
        result
    }

    async fn delete_document(&self, index: &str, filename: &str) -> Result<u64, GatewayError> {
        let result = self.delete_inner(index, filename).await;
        self.record(Operation::Delete, &result);
        if let Ok(deleted) = &result {
            tracing::info!(index, filename, deleted, "Document deleted");
        }
        result
    }

    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>, GatewayError> {
        let result = self.search_inner(index, query).await;
        self.record(Operation::Search, &result);
        result
    }

    async fn list_documents(&self, index: &str) -> Result<Vec<String>, GatewayError> {
        if self.ensure_index(index).await? {
            return Ok(Vec::new());
        }
        let documents = self.opensearch.list_filenames(index).await?;
        tracing::info!(index, documents = documents.len(), "Documents fetched");
        Ok(documents)
    }

    async fn readiness(&self) -> Readiness {
        let model_id = self.provisioning.model_id.clone();
        match self.opensearch.get_model(&model_id).await {
            Ok(model) => Readiness {
                ready: model.state == Some(ModelState::Deployed),
                model_id,
                model_state: model.state,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Model readiness check failed");
                Readiness {
                    ready: false,
                    model_id,
                    model_state: None,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Reject user ids that OpenSearch would not accept as index names.
pub fn validate_index_name(index: &str) -> Result<(), GatewayError> {
    let invalid = index.is_empty()
        || index.len() > MAX_INDEX_NAME_BYTES
        || index == "."
        || index == ".."
        || index.starts_with(['-', '_', '+'])
        || index.chars().any(|c| c.is_uppercase() || INVALID_INDEX_CHARS.contains(&c));

    if invalid {
        return Err(GatewayError::InvalidIndex(index.to_string()));
    }
    Ok(())
}
