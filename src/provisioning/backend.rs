//! Remote operations consumed by the provisioning workflow.

use crate::opensearch::{ModelRecord, OpenSearchError, OpenSearchService, TaskStatus};
use async_trait::async_trait;
use serde_json::Value;

/// Interface over the OpenSearch calls needed to provision the ML pipeline.
///
/// Every method maps to exactly one REST request. Logical absence is `Ok(None)`; transport
/// and HTTP failures are `Err`.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Apply a cluster settings document.
    async fn update_cluster_settings(&self, settings: &Value) -> Result<Value, OpenSearchError>;

    /// Look up a model group id by name.
    async fn find_model_group_id(&self, name: &str) -> Result<Option<String>, OpenSearchError>;

    /// Create a model group and return its id.
    async fn create_model_group(
        &self,
        name: &str,
        description: &str,
        access_mode: &str,
    ) -> Result<String, OpenSearchError>;

    /// Look up a model by name inside a group.
    async fn find_model(
        &self,
        name: &str,
        group_id: &str,
    ) -> Result<Option<ModelRecord>, OpenSearchError>;

    /// Submit a model registration and return its task id.
    async fn register_model(
        &self,
        name: &str,
        version: &str,
        group_id: &str,
    ) -> Result<String, OpenSearchError>;

    /// Read the status of an asynchronous task.
    async fn get_task(&self, task_id: &str) -> Result<TaskStatus, OpenSearchError>;

    /// Trigger deployment of a registered model.
    async fn deploy_model(&self, model_id: &str) -> Result<Value, OpenSearchError>;

    /// Create or overwrite the text-embedding ingest pipeline.
    async fn create_ingest_pipeline(
        &self,
        pipeline_id: &str,
        description: &str,
        model_id: &str,
    ) -> Result<Value, OpenSearchError>;
}

#[async_trait]
impl ProvisioningBackend for OpenSearchService {
    async fn update_cluster_settings(&self, settings: &Value) -> Result<Value, OpenSearchError> {
        OpenSearchService::update_cluster_settings(self, settings).await
    }

    async fn find_model_group_id(&self, name: &str) -> Result<Option<String>, OpenSearchError> {
        OpenSearchService::find_model_group_id(self, name).await
    }

    async fn create_model_group(
        &self,
        name: &str,
        description: &str,
        access_mode: &str,
    ) -> Result<String, OpenSearchError> {
        OpenSearchService::create_model_group(self, name, description, access_mode).await
    }

    async fn find_model(
        &self,
        name: &str,
        group_id: &str,
    ) -> Result<Option<ModelRecord>, OpenSearchError> {
        OpenSearchService::find_model(self, name, group_id).await
    }

    async fn register_model(
        &self,
        name: &str,
        version: &str,
        group_id: &str,
    ) -> Result<String, OpenSearchError> {
        OpenSearchService::register_model(self, name, version, group_id).await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskStatus, OpenSearchError> {
        OpenSearchService::get_task(self, task_id).await
    }

    async fn deploy_model(&self, model_id: &str) -> Result<Value, OpenSearchError> {
        OpenSearchService::deploy_model(self, model_id).await
    }

    async fn create_ingest_pipeline(
        &self,
        pipeline_id: &str,
        description: &str,
        model_id: &str,
    ) -> Result<Value, OpenSearchError> {
        OpenSearchService::create_ingest_pipeline(self, pipeline_id, description, model_id).await
    }
}
