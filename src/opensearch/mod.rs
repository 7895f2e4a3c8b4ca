//! OpenSearch integration: REST client, ML Commons types and configuration templates.

pub mod client;
pub mod templates;
pub mod types;

pub use client::{OpenSearchService, text_embedding_pipeline};
pub use templates::{TemplateError, load_json_template};
pub use types::{BulkSummary, ModelRecord, ModelState, OpenSearchError, TaskState, TaskStatus};
