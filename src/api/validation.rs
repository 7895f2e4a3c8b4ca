//! Request body validation shared by every gateway route.
//!
//! Clients send JSON bodies even on `GET` routes, so bodies are read as raw bytes and checked
//! here before any typed extraction happens.

use super::ApiError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const NO_PAYLOAD: &str = "No JSON payload provided";

/// Parse `body` into `T` after checking that every `required` field holds a non-empty value.
pub(crate) fn parse_payload<T>(body: &[u8], required: &[&str]) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let payload = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => map,
        _ => return Err(ApiError::bad_request(NO_PAYLOAD)),
    };

    let missing = missing_fields(&payload, required);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Missing required field(s): {}",
            format_field_list(&missing)
        )));
    }

    serde_json::from_value(Value::Object(payload))
        .map_err(|err| ApiError::bad_request(format!("Invalid request payload: {err}")))
}

fn missing_fields<'a>(payload: &Map<String, Value>, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|field| payload.get(*field).is_none_or(is_blank))
        .collect()
}

/// Null, `false`, zero and empty strings or containers do not count as a provided value.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn format_field_list(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|field| format!("'{field}'")).collect();
    format!("[{}]", quoted.join(", "))
}
