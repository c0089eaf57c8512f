//! Schema Registry: compiles and caches the JSON Schemas that artifacts are
//! validated against before a task is allowed to complete.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use jsonschema::Validator;
use thiserror::Error;

/// A single failed assertion against a schema, truncated to keep logs and
/// error payloads small when the offending value is large.
#[derive(Debug, Clone)]
pub struct SchemaFailure {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, truncate_snippet(&self.message, 200))
    }
}

fn truncate_snippet(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    // `max` is a byte offset that may land inside a multi-byte char; walk
    // char boundaries to find the longest valid prefix at or under it.
    let boundary = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..boundary])
}

/// Raised when a payload does not conform to its declared schema.
#[derive(Debug, Error)]
#[error("payload failed schema validation against {schema_id}: {}", failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
pub struct SchemaValidationError {
    pub schema_id: String,
    pub failures: Vec<SchemaFailure>,
}

/// Compiles and caches JSON Schemas by id. Thread-safe: the orchestrator and
/// every concurrent worker validate through the same registry instance.
#[derive(Default)]
pub struct SchemaRegistry {
    compiled: RwLock<HashMap<String, Validator>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a schema under `schema_id`, replacing any
    /// schema previously registered under the same id.
    pub fn register(&self, schema_id: impl Into<String>, schema: &serde_json::Value) -> Result<()> {
        let schema_id = schema_id.into();
        let validator = jsonschema::validator_for(schema)
            .with_context(|| format!("compiling schema {schema_id}"))?;
        self.compiled
            .write()
            .expect("schema registry lock poisoned")
            .insert(schema_id, validator);
        Ok(())
    }

    pub fn is_registered(&self, schema_id: &str) -> bool {
        self.compiled
            .read()
            .expect("schema registry lock poisoned")
            .contains_key(schema_id)
    }

    /// Validate `payload` against the schema registered under `schema_id`.
    ///
    /// Returns every failing assertion rather than stopping at the first,
    /// so a worker reporting a validation failure gives the agent (or a
    /// human reviewing the retry) the complete picture in one pass.
    pub fn validate(
        &self,
        schema_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), SchemaValidationError> {
        let guard = self.compiled.read().expect("schema registry lock poisoned");
        let Some(validator) = guard.get(schema_id) else {
            return Err(SchemaValidationError {
                schema_id: schema_id.to_owned(),
                failures: vec![SchemaFailure {
                    path: "$".to_owned(),
                    message: "no schema registered under this id".to_owned(),
                }],
            });
        };

        let failures: Vec<SchemaFailure> = validator
            .iter_errors(payload)
            .map(|e| SchemaFailure {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError {
                schema_id: schema_id.to_owned(),
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["title", "body"],
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "body": {"type": "string"}
            }
        })
    }

    #[test]
    fn valid_payload_passes() {
        let registry = SchemaRegistry::new();
        registry.register("draft.v1", &sample_schema()).unwrap();

        let result = registry.validate("draft.v1", &json!({"title": "Hi", "body": "text"}));
        assert!(result.is_ok());
    }

    #[test]
    fn missing_field_is_reported() {
        let registry = SchemaRegistry::new();
        registry.register("draft.v1", &sample_schema()).unwrap();

        let err = registry
            .validate("draft.v1", &json!({"title": ""}))
            .unwrap_err();
        assert_eq!(err.schema_id, "draft.v1");
        assert!(!err.failures.is_empty());
    }

    #[test]
    fn unregistered_schema_is_a_failure_not_a_panic() {
        let registry = SchemaRegistry::new();
        let err = registry.validate("missing", &json!({})).unwrap_err();
        assert_eq!(err.failures.len(), 1);
    }

    #[test]
    fn re_registering_replaces_the_old_schema() {
        let registry = SchemaRegistry::new();
        registry.register("s", &json!({"type": "string"})).unwrap();
        assert!(registry.validate("s", &json!(1)).is_err());

        registry.register("s", &json!({"type": "number"})).unwrap();
        assert!(registry.validate("s", &json!(1)).is_ok());
    }
}
