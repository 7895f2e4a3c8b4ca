//! JSON configuration templates stored next to the service (`cluster-settings.json`,
//! `knn-index.json`).
//!
//! Templates may reference variables as `{{ name }}`. Placeholders without a matching
//! variable are left untouched.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a configuration template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template file could not be read.
    #[error("Failed to read template {path}: {source}")]
    Io {
        /// Path of the template.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Rendered template is not valid JSON.
    #[error("Template {path} did not render to valid JSON: {source}")]
    Parse {
        /// Path of the template.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Substitute `{{ name }}` placeholders with the supplied variables.
pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len + 2;
        let key = rest[start + 2..end - 2].trim();
        rendered.push_str(&rest[..start]);
        match variables.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    rendered.push_str(rest);
    rendered
}

/// Read a template from disk, render it and parse the result as JSON.
pub async fn load_json_template(
    path: &Path,
    variables: &[(&str, &str)],
) -> Result<Value, TemplateError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_str(&render(&source, variables)).map_err(|source| TemplateError::Parse {
        path: path.display().to_string(),
        source,
    })
}
