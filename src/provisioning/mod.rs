//! Startup provisioning of the OpenSearch ML pipeline.

pub mod backend;
mod orchestrator;
pub mod polling;
pub mod types;

pub use backend::ProvisioningBackend;
pub use orchestrator::Provisioner;
pub use polling::{PollOutcome, PollPolicy, Progress, poll_until, shutdown_requested};
pub use types::{ProvisioningConfig, ProvisioningError, ProvisioningResult};
