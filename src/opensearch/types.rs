//! Shared types used by the OpenSearch client and the provisioning workflow.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with OpenSearch.
#[derive(Debug, Error)]
pub enum OpenSearchError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid OpenSearch URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response (connection refused, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// OpenSearch responded with an unexpected status code.
    #[error("Unexpected OpenSearch response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from OpenSearch.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body was not the JSON shape the endpoint documents.
    #[error("Malformed OpenSearch response: {0}")]
    Decode(#[from] serde_json::Error),
    /// A successful response lacked a field the caller depends on.
    #[error("Response from {endpoint} is missing `{field}`")]
    MissingField {
        /// Endpoint that produced the response.
        endpoint: String,
        /// Name of the absent field.
        field: &'static str,
    },
    /// Bulk request completed but some items were rejected.
    #[error("Bulk request rejected {failed} of {total} documents")]
    BulkRejected {
        /// Number of items reporting an error.
        failed: usize,
        /// Number of items submitted.
        total: usize,
    },
}

/// Lifecycle state reported by ML Commons for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    /// Model record exists but registration has not started.
    Created,
    /// Model chunks are being uploaded.
    Registering,
    /// Registration finished; the model can be deployed.
    Registered,
    /// Registration failed.
    RegisterFailed,
    /// Deployment in progress.
    Deploying,
    /// Model is loaded on every eligible node.
    Deployed,
    /// Model is loaded on some eligible nodes.
    PartiallyDeployed,
    /// Model was unloaded after a deployment.
    Undeployed,
    /// Deployment failed.
    DeployFailed,
    /// Any state this gateway does not know about.
    #[serde(other)]
    Unknown,
}

impl ModelState {
    /// Whether the model has left the registration phase successfully.
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            Self::Registered
                | Self::Deploying
                | Self::Deployed
                | Self::PartiallyDeployed
                | Self::Undeployed
                | Self::DeployFailed
        )
    }
}

/// State reported for an asynchronous ML Commons task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task accepted but not scheduled yet.
    Created,
    /// Task is running.
    Running,
    /// Task finished successfully.
    Completed,
    /// Task finished on some nodes and failed on others.
    CompletedWithError,
    /// Task failed.
    Failed,
    /// Task was cancelled.
    Cancelled,
    /// Any state this gateway does not know about.
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Whether the task ended without producing a usable result.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Cancelled | Self::CompletedWithError
        )
    }
}

/// Status document returned by `GET /_plugins/_ml/tasks/{task_id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStatus {
    /// Current task state; absent while the task record is still being written.
    #[serde(default)]
    pub state: Option<TaskState>,
    /// Model produced by a registration task.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Error message attached to a failed task.
    #[serde(default)]
    pub error: Option<String>,
}

/// Model entry as seen through the ML Commons model APIs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRecord {
    /// Backend-assigned model identifier.
    pub id: String,
    /// Registered model name.
    pub name: Option<String>,
    /// Current lifecycle state, when reported.
    pub state: Option<ModelState>,
}

/// Outcome of a bulk upload across all batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Number of documents accepted by OpenSearch.
    pub indexed: usize,
    /// Number of bulk requests issued.
    pub batches: usize,
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    pub(crate) hits: SearchHits,
}

#[derive(Deserialize)]
pub(crate) struct SearchHits {
    #[serde(default)]
    pub(crate) hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub(crate) struct SearchHit {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    #[serde(rename = "_source", default)]
    pub(crate) source: Map<String, Value>,
}

#[derive(Deserialize)]
pub(crate) struct ModelSource {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) model_state: Option<ModelState>,
    #[serde(default)]
    pub(crate) chunk_number: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct BulkResponse {
    #[serde(default)]
    pub(crate) errors: bool,
    #[serde(default)]
    pub(crate) items: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct DeleteByQueryResponse {
    #[serde(default)]
    pub(crate) deleted: u64,
}
