//! JSON Schema validation wrapper.

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("schema validation failed at {path}: {message}")]
    Validation { path: String, message: String },
}

/// Validate a payload against a JSON Schema. The error carries the dotted
/// instance path of the first failure.
pub fn validate_schema(payload: &Value, schema: &Value) -> Result<(), SchemaError> {
    let compiled =
        JSONSchema::compile(schema).map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;

    if let Err(mut errors) = compiled.validate(payload) {
        if let Some(first) = errors.next() {
            return Err(SchemaError::Validation {
                path: dotted_path(&first.instance_path.to_string()),
                message: first.to_string(),
            });
        }
    }
    Ok(())
}

fn dotted_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "<root>".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}
