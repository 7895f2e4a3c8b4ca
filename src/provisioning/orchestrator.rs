//! Startup sequence bringing a fresh cluster to a state where documents can be ingested
//! with embeddings and searched semantically.
//!
//! Steps run strictly in order: cluster settings, model group, model registration, model
//! deployment, ingest pipeline. Each step looks up existing state before creating anything,
//! so re-running the sequence against a provisioned cluster creates nothing new.

use crate::opensearch::{ModelRecord, ModelState, TaskState, TaskStatus, load_json_template};
use crate::provisioning::backend::ProvisioningBackend;
use crate::provisioning::polling::{PollOutcome, Progress, poll_until};
use crate::provisioning::types::{ProvisioningConfig, ProvisioningError, ProvisioningResult};
use tokio::sync::watch;

/// Drives the provisioning sequence against a backend.
pub struct Provisioner<'a, B: ?Sized> {
    backend: &'a B,
    config: ProvisioningConfig,
}

impl<'a, B> Provisioner<'a, B>
where
    B: ProvisioningBackend + ?Sized,
{
    /// Create a provisioner for `backend`.
    pub fn new(backend: &'a B, config: ProvisioningConfig) -> Self {
        Self { backend, config }
    }

    /// Run the full sequence once.
    ///
    /// `shutdown` aborts any registration wait as soon as it holds `true`.
    pub async fn provision(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ProvisioningResult, ProvisioningError> {
        tracing::info!("Provisioning OpenSearch ML pipeline");

        self.apply_cluster_settings().await;
        let model_group_id = self.ensure_model_group().await?;
        let model_id = self
            .ensure_model_registered(&model_group_id, &mut shutdown)
            .await?;
        self.deploy_model(&model_id).await;
        self.create_ingest_pipeline(&model_id).await?;

        tracing::info!(
            model_group_id = %model_group_id,
            model_id = %model_id,
            pipeline_id = %self.config.pipeline_id,
            "Provisioning complete"
        );
        Ok(ProvisioningResult {
            model_group_id,
            model_id,
            pipeline_id: self.config.pipeline_id.clone(),
        })
    }

    /// Load and apply the cluster settings template. Failures are logged and ignored.
    ///
    /// Returns whether the settings were applied.
    pub async fn apply_cluster_settings(&self) -> bool {
        let path = &self.config.cluster_settings_path;
        let settings = match load_json_template(path, &[]).await {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(error = %error, "Skipping cluster settings update");
                return false;
            }
        };

        match self.backend.update_cluster_settings(&settings).await {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(error = %error, "Cluster settings update failed; continuing");
                false
            }
        }
    }

    /// Reuse the configured model group, creating it when absent.
    pub async fn ensure_model_group(&self) -> Result<String, ProvisioningError> {
        let name = &self.config.model_group_name;
        let unavailable = |source| ProvisioningError::ModelGroup {
            name: name.clone(),
            source,
        };

        if let Some(id) = self
            .backend
            .find_model_group_id(name)
            .await
            .map_err(unavailable)?
        {
            tracing::info!(group_name = %name, model_group_id = %id, "Model group already exists");
            return Ok(id);
        }

        let id = self
            .backend
            .create_model_group(
                name,
                &self.config.model_group_description,
                &self.config.model_group_access_mode,
            )
            .await
            .map_err(unavailable)?;
        tracing::info!(group_name = %name, model_group_id = %id, "Model group created");
        Ok(id)
    }

    /// Resolve the id of a registered model inside `group_id`.
    ///
    /// An existing model is waited on until registration finishes and is never resubmitted.
    /// Otherwise a registration is submitted and its task is polled until it yields a model id.
    pub async fn ensure_model_registered(
        &self,
        group_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<String, ProvisioningError> {
        let name = self.config.model_name.as_str();
        let backend = self.backend;

        let existing = backend
            .find_model(name, group_id)
            .await
            .map_err(|source| ProvisioningError::Remote {
                step: "model lookup",
                source,
            })?;

        if let Some(model) = existing {
            if model.state.is_some_and(ModelState::is_registered) {
                tracing::info!(model_id = %model.id, state = ?model.state, "Model already registered");
                return Ok(model.id);
            }

            tracing::info!(model_id = %model.id, "Model already exists in model group; waiting for registration");
            let outcome = poll_until(
                "model registration",
                &self.config.poll,
                shutdown,
                move || async move { backend.find_model(name, group_id).await },
                classify_model,
            )
            .await;
            return self.resolve_registered_model(outcome);
        }

        let task_id = backend
            .register_model(name, &self.config.model_version, group_id)
            .await
            .map_err(|source| ProvisioningError::Remote {
                step: "model registration",
                source,
            })?;
        tracing::info!(task_id = %task_id, "Model registration submitted");

        let task = task_id.as_str();
        let outcome = poll_until(
            "model registration task",
            &self.config.poll,
            shutdown,
            move || async move { backend.get_task(task).await.map(Some) },
            classify_task,
        )
        .await;
        self.resolve_task(&task_id, outcome)
    }

    /// Request deployment of `model_id` without waiting for it to finish.
    pub async fn deploy_model(&self, model_id: &str) {
        if let Err(error) = self.backend.deploy_model(model_id).await {
            tracing::warn!(model_id, error = %error, "Model deployment request failed; continuing");
        }
    }

    /// Create or overwrite the text-embedding ingest pipeline bound to `model_id`.
    pub async fn create_ingest_pipeline(&self, model_id: &str) -> Result<(), ProvisioningError> {
        let pipeline_id = &self.config.pipeline_id;
        self.backend
            .create_ingest_pipeline(pipeline_id, &self.config.pipeline_description, model_id)
            .await
            .map_err(|source| ProvisioningError::Pipeline {
                pipeline_id: pipeline_id.clone(),
                source,
            })?;
        Ok(())
    }

    fn resolve_registered_model(
        &self,
        outcome: PollOutcome<ModelRecord>,
    ) -> Result<String, ProvisioningError> {
        match outcome {
            PollOutcome::Completed(model) => Ok(model.id),
            PollOutcome::Failed(model) => Err(ProvisioningError::RegistrationFailed {
                detail: format!("model {} reported {:?}", model.id, model.state),
            }),
            PollOutcome::TimedOut(last) => Err(ProvisioningError::RegistrationTimedOut {
                timeout: self.config.poll.timeout,
                last_state: format!("{:?}", last.and_then(|model| model.state)),
            }),
            PollOutcome::Cancelled(_) => Err(ProvisioningError::Cancelled),
        }
    }

    fn resolve_task(
        &self,
        task_id: &str,
        outcome: PollOutcome<TaskStatus>,
    ) -> Result<String, ProvisioningError> {
        match outcome {
            PollOutcome::Completed(status) => {
                status
                    .model_id
                    .ok_or_else(|| ProvisioningError::MissingModelId {
                        task_id: task_id.to_string(),
                    })
            }
            PollOutcome::Failed(status) => Err(ProvisioningError::RegistrationFailed {
                detail: format!(
                    "task {task_id} reported {:?}: {}",
                    status.state,
                    status.error.unwrap_or_default()
                ),
            }),
            PollOutcome::TimedOut(last) => Err(ProvisioningError::RegistrationTimedOut {
                timeout: self.config.poll.timeout,
                last_state: format!("{:?}", last.and_then(|status| status.state)),
            }),
            PollOutcome::Cancelled(_) => Err(ProvisioningError::Cancelled),
        }
    }
}

fn classify_model(model: &ModelRecord) -> Progress {
    match model.state {
        Some(state) if state.is_registered() => Progress::Done,
        Some(ModelState::RegisterFailed) => Progress::Failed,
        _ => Progress::Pending,
    }
}

fn classify_task(status: &TaskStatus) -> Progress {
    match status.state {
        Some(TaskState::Completed) => Progress::Done,
        Some(state) if state.is_failure() => Progress::Failed,
        _ => Progress::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(state: Option<ModelState>) -> ModelRecord {
        ModelRecord {
            id: "model-1".into(),
            name: Some("minilm".into()),
            state,
        }
    }

    #[test]
    fn model_classification_follows_lifecycle() {
        assert_eq!(classify_model(&model(None)), Progress::Pending);
        assert_eq!(
            classify_model(&model(Some(ModelState::Registering))),
            Progress::Pending
        );
        assert_eq!(
            classify_model(&model(Some(ModelState::Deployed))),
            Progress::Done
        );
        assert_eq!(
            classify_model(&model(Some(ModelState::RegisterFailed))),
            Progress::Failed
        );
    }

    #[test]
    fn task_classification_treats_partial_completion_as_failure() {
        let status = |state| TaskStatus {
            state,
            ..TaskStatus::default()
        };
        assert_eq!(classify_task(&status(None)), Progress::Pending);
        assert_eq!(
            classify_task(&status(Some(TaskState::Running))),
            Progress::Pending
        );
        assert_eq!(
            classify_task(&status(Some(TaskState::Completed))),
            Progress::Done
        );
        assert_eq!(
            classify_task(&status(Some(TaskState::CompletedWithError))),
            Progress::Failed
        );
    }
}
