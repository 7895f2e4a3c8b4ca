//! Result, configuration and error types for the provisioning workflow.

use crate::config::Config;
use crate::opensearch::OpenSearchError;
use crate::provisioning::polling::PollPolicy;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Identifiers derived while provisioning, handed to the request-serving layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningResult {
    /// Id of the model group owning the embedding model.
    pub model_group_id: String,
    /// Id of the registered (and deployment-requested) embedding model.
    pub model_id: String,
    /// Id of the text-embedding ingest pipeline.
    pub pipeline_id: String,
}

/// Fixed parameters of the provisioning sequence.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Location of the cluster settings template.
    pub cluster_settings_path: PathBuf,
    /// Name of the model group.
    pub model_group_name: String,
    /// Description attached to a newly created model group.
    pub model_group_description: String,
    /// Access mode of a newly created model group.
    pub model_group_access_mode: String,
    /// Name of the pretrained model to register.
    pub model_name: String,
    /// Version submitted with the registration.
    pub model_version: String,
    /// Id of the ingest pipeline.
    pub pipeline_id: String,
    /// Description of the ingest pipeline.
    pub pipeline_description: String,
    /// Polling parameters used while waiting for registration.
    pub poll: PollPolicy,
}

impl ProvisioningConfig {
    /// Derive the provisioning parameters from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            cluster_settings_path: config.cluster_settings_path(),
            model_group_name: config.model_group_name.clone(),
            model_group_description: "NLP model group".into(),
            model_group_access_mode: "public".into(),
            model_name: config.model_url.clone(),
            model_version: config.model_version.clone(),
            pipeline_id: config.pipeline_name.clone(),
            pipeline_description: "NLP ingest pipeline".into(),
            poll: PollPolicy {
                interval: config.poll_interval(),
                timeout: config.poll_timeout(),
                retry_backoff: config.retry_backoff(),
            },
        }
    }
}

/// Fatal provisioning failures. The gateway must not start serving after any of these.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Model group could neither be found nor created.
    #[error("Model group {name:?} unavailable: {source}")]
    ModelGroup {
        /// Configured group name.
        name: String,
        /// Underlying backend failure.
        #[source]
        source: OpenSearchError,
    },
    /// A remote call needed to resolve the model failed.
    #[error("{step} failed: {source}")]
    Remote {
        /// Workflow step that issued the call.
        step: &'static str,
        /// Underlying backend failure.
        #[source]
        source: OpenSearchError,
    },
    /// Registration did not reach a terminal state within the polling timeout.
    #[error("Model registration did not finish within {timeout:?} (last state: {last_state})")]
    RegistrationTimedOut {
        /// Configured polling timeout.
        timeout: Duration,
        /// Last state observed before giving up.
        last_state: String,
    },
    /// Registration ended in a failure state.
    #[error("Model registration failed: {detail}")]
    RegistrationFailed {
        /// State and error message reported by the backend.
        detail: String,
    },
    /// Registration task completed without naming the model it produced.
    #[error("Task {task_id} completed without a model id")]
    MissingModelId {
        /// Id of the registration task.
        task_id: String,
    },
    /// Ingest pipeline could not be created.
    #[error("Ingest pipeline {pipeline_id:?} could not be created: {source}")]
    Pipeline {
        /// Configured pipeline id.
        pipeline_id: String,
        /// Underlying backend failure.
        #[source]
        source: OpenSearchError,
    },
    /// Shutdown was requested while provisioning was waiting.
    #[error("Provisioning cancelled by shutdown")]
    Cancelled,
}
