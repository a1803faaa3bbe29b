//! Event schema validation — JSON Schema draft-07
//!
//! Every event type declares a JSON schema for its payload. The schema is
//! itself checked against the bundled draft-07 meta-schema before it is
//! compiled, so a malformed declaration (e.g. `"type": "objekt"` or
//! `"required": "id"`) is rejected as a configuration error rather than
//! silently validating nothing.

use crate::error::{EventStoreError, Result};
use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;

/// The JSON Schema draft-07 meta-schema, bundled with the crate
pub const DRAFT_07_META_SCHEMA: &str = include_str!("../schemas/json-schema-draft-07.json");

static META_SCHEMA: OnceLock<std::result::Result<Validator, String>> = OnceLock::new();

/// Compiled draft-07 meta-schema, loaded once per process
pub fn meta_schema() -> Result<&'static Validator> {
    let compiled = META_SCHEMA.get_or_init(|| {
        let document: Value = serde_json::from_str(DRAFT_07_META_SCHEMA)
            .map_err(|e| format!("Failed to parse bundled meta-schema: {}", e))?;
        jsonschema::draft7::new(&document)
            .map_err(|e| format!("Failed to compile bundled meta-schema: {}", e))
    });

    compiled
        .as_ref()
        .map_err(|reason| EventStoreError::Config(reason.clone()))
}

/// Check whether a schema document conforms to the draft-07 meta-schema
pub fn is_valid_schema(schema: &Value) -> Result<bool> {
    Ok(meta_schema()?.is_valid(schema))
}

/// A payload schema that passed the meta-schema check and is ready to validate data
pub struct CompiledSchema {
    validator: Validator,
}

impl CompiledSchema {
    /// Check `schema` against the meta-schema and compile it
    ///
    /// `event_type` is only used for error reporting.
    pub fn compile(event_type: &str, schema: &Value) -> Result<Self> {
        if !is_valid_schema(schema)? {
            return Err(EventStoreError::InvalidSchema {
                event_type: event_type.to_string(),
            });
        }

        // Meta-valid schemas can still fail to build (e.g. an unparsable `pattern`)
        let validator = jsonschema::draft7::new(schema).map_err(|e| {
            tracing::warn!(event_type, error = %e, "Event schema failed to compile");
            EventStoreError::InvalidSchema {
                event_type: event_type.to_string(),
            }
        })?;

        Ok(Self { validator })
    }

    /// Every violation of the schema by `data`, empty when valid
    pub fn violations(&self, data: &Value) -> Vec<String> {
        self.validator
            .iter_errors(data)
            .map(|error| error.to_string())
            .collect()
    }

    /// Whether `data` conforms to the schema
    pub fn is_valid(&self, data: &Value) -> bool {
        self.validator.is_valid(data)
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema").finish_non_exhaustive()
    }
}
