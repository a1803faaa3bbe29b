//! Domain events — immutable, schema-validated payloads
//!
//! An event type is declared once as a `static` [`EventKind`] carrying a
//! stable name and a function returning its JSON schema:
//!
//! ```rust
//! use event_store::{Event, EventKind};
//! use serde_json::{json, Value};
//!
//! fn widget_created_schema() -> Value {
//!     json!({
//!         "type": "object",
//!         "required": ["widget_id"],
//!         "properties": { "widget_id": { "type": "integer" } }
//!     })
//! }
//!
//! pub static WIDGET_CREATED: EventKind =
//!     EventKind::new("WidgetCreatedEvent", widget_created_schema);
//!
//! let event = Event::new(&WIDGET_CREATED, json!({"widget_id": 42})).unwrap();
//! assert_eq!(event.data()["widget_id"], 42);
//! ```

use crate::error::{EventStoreError, Result};
use crate::schema::CompiledSchema;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Descriptor of a concrete event type
///
/// The schema is checked against the draft-07 meta-schema and compiled the
/// first time an event of this kind is constructed. The outcome, valid or
/// not, is memoized for the lifetime of the process.
pub struct EventKind {
    name: &'static str,
    schema: fn() -> Value,
    compiled: OnceLock<Option<CompiledSchema>>,
    compilations: AtomicUsize,
}

impl EventKind {
    /// Declare an event type with its name and payload schema
    pub const fn new(name: &'static str, schema: fn() -> Value) -> Self {
        Self {
            name,
            schema,
            compiled: OnceLock::new(),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Stable event type name, used as the routing key and in job payloads
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared payload schema
    pub fn schema(&self) -> Value {
        (self.schema)()
    }

    /// Number of times the schema was checked and compiled (0 or 1)
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Ensure the declared schema is valid, compiling it on first use
    pub fn validate_schema(&self) -> Result<()> {
        self.compiled_schema().map(|_| ())
    }

    /// Whether `other` is this very event type
    pub fn is(&self, other: &EventKind) -> bool {
        std::ptr::eq(self, other)
    }

    fn compiled_schema(&self) -> Result<&CompiledSchema> {
        let compiled = self.compiled.get_or_init(|| {
            self.compilations.fetch_add(1, Ordering::Relaxed);
            match CompiledSchema::compile(self.name, &self.schema()) {
                Ok(schema) => Some(schema),
                Err(e) => {
                    tracing::error!(event_type = self.name, error = %e, "Event schema is invalid");
                    None
                }
            }
        });

        compiled.as_ref().ok_or_else(|| EventStoreError::InvalidSchema {
            event_type: self.name.to_string(),
        })
    }
}

impl std::fmt::Debug for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventKind").field("name", &self.name).finish()
    }
}

/// Immutable event payload
///
/// Always a JSON object. Keys are strings, so lookups by `&str` and by
/// `String` are interchangeable. Cloning shares the underlying map.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData(Arc<Value>);

impl EventData {
    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether a top-level field is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Deserialize a single field; a missing field deserializes from `null`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key).cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Deserialize the whole payload into a typed struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    /// Iterate over the top-level fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.as_object().into_iter().flatten()
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.as_object().map_or(0, |map| map.len())
    }

    /// Whether the payload has no fields
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the payload as a JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Owned copy of the payload, as passed to consumers
    pub fn to_value(&self) -> Value {
        self.0.as_ref().clone()
    }
}

impl std::ops::Index<&str> for EventData {
    type Output = Value;

    /// Returns `Value::Null` for a missing field
    fn index(&self, key: &str) -> &Value {
        &self.0[key]
    }
}

impl Serialize for EventData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

/// A validated occurrence of an [`EventKind`]
#[derive(Clone)]
pub struct Event {
    kind: &'static EventKind,
    data: EventData,
}

impl Event {
    /// Build an event, validating its payload
    ///
    /// Fails with `InvalidSchema` if the kind's schema is malformed,
    /// `InvalidData` if `data` is not a JSON object, and `SchemaMismatch`
    /// (listing every violation) if it does not conform to the schema.
    pub fn new(kind: &'static EventKind, data: Value) -> Result<Self> {
        let schema = kind.compiled_schema()?;

        let map = match data {
            Value::Object(map) => map,
            other => {
                return Err(EventStoreError::InvalidData {
                    event_type: kind.name.to_string(),
                    reason: format!("event data must be a JSON object, got {}", json_type(&other)),
                })
            }
        };

        let payload = Value::Object(map);
        let errors = schema.violations(&payload);
        if !errors.is_empty() {
            return Err(EventStoreError::SchemaMismatch {
                event_type: kind.name.to_string(),
                errors,
            });
        }

        Ok(Self {
            kind,
            data: EventData(Arc::new(payload)),
        })
    }

    /// Build an event from any serializable payload
    pub fn from_payload<T: Serialize>(kind: &'static EventKind, payload: &T) -> Result<Self> {
        Self::new(kind, serde_json::to_value(payload)?)
    }

    /// The event type
    pub fn kind(&self) -> &'static EventKind {
        self.kind
    }

    /// The event type name
    pub fn name(&self) -> &'static str {
        self.kind.name
    }

    /// The validated payload
    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Whether this event is of exactly the given kind
    pub fn is_kind(&self, kind: &EventKind) -> bool {
        self.kind.is(kind)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind.name)
            .field("data", self.data.as_value())
            .finish()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn widget_schema() -> Value {
        json!({
            "type": "object",
            "required": ["widget_id"],
            "properties": {
                "widget_id": { "type": "integer" },
                "name": { "type": "string" }
            }
        })
    }

    fn broken_schema() -> Value {
        json!({ "type": "objekt" })
    }

    fn loose_schema() -> Value {
        json!({})
    }

    static WIDGET: EventKind = EventKind::new("WidgetCreatedEvent", widget_schema);
    static BROKEN: EventKind = EventKind::new("BrokenEvent", broken_schema);
    static LOOSE: EventKind = EventKind::new("LooseEvent", loose_schema);

    #[test]
    fn test_new_valid_event() {
        let event = Event::new(&WIDGET, json!({"widget_id": 42, "name": "gear"})).unwrap();
        assert_eq!(event.name(), "WidgetCreatedEvent");
        assert!(event.is_kind(&WIDGET));
        assert!(!event.is_kind(&LOOSE));
        assert_eq!(event.data()["widget_id"], 42);
        assert_eq!(event.data().get("name"), Some(&json!("gear")));
        assert_eq!(event.data().len(), 2);
    }

    #[test]
    fn test_string_and_owned_key_lookup_agree() {
        let event = Event::new(&WIDGET, json!({"widget_id": 7})).unwrap();
        let owned = String::from("widget_id");
        assert_eq!(event.data().get("widget_id"), event.data().get(&owned));
        assert!(event.data().contains_key(&owned));
    }

    #[test]
    fn test_missing_field_indexes_to_null() {
        let event = Event::new(&WIDGET, json!({"widget_id": 7})).unwrap();
        assert_eq!(event.data()["absent"], Value::Null);
        assert!(event.data().get("absent").is_none());
    }

    #[test]
    fn test_missing_required_key() {
        let err = Event::new(&WIDGET, json!({"name": "gear"})).unwrap_err();
        match err {
            EventStoreError::SchemaMismatch { event_type, errors } => {
                assert_eq!(event_type, "WidgetCreatedEvent");
                assert!(errors.iter().any(|e| e.contains("widget_id")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mismatch_reports_every_violation() {
        let err = Event::new(&WIDGET, json!({"widget_id": "x", "name": 3})).unwrap_err();
        match err {
            EventStoreError::SchemaMismatch { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_data_must_be_object() {
        for data in [json!([1, 2]), json!("widget"), json!(null), json!(5)] {
            let err = Event::new(&LOOSE, data).unwrap_err();
            assert!(matches!(err, EventStoreError::InvalidData { .. }));
        }
    }

    #[test]
    fn test_invalid_schema_is_memoized() {
        for _ in 0..3 {
            let err = Event::new(&BROKEN, json!({})).unwrap_err();
            assert!(matches!(err, EventStoreError::InvalidSchema { ref event_type } if event_type == "BrokenEvent"));
        }
        assert_eq!(BROKEN.compilations(), 1);
        assert!(BROKEN.validate_schema().is_err());
        assert_eq!(BROKEN.compilations(), 1);
    }

    #[test]
    fn test_valid_schema_compiles_once() {
        for id in 0..5 {
            Event::new(&WIDGET, json!({"widget_id": id})).unwrap();
        }
        assert_eq!(WIDGET.compilations(), 1);
    }

    #[test]
    fn test_typed_access() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct WidgetCreated {
            widget_id: i64,
            name: Option<String>,
        }

        let payload = WidgetCreated {
            widget_id: 9,
            name: None,
        };
        let event = Event::from_payload(&LOOSE, &payload).unwrap();
        let decoded: WidgetCreated = event.data().deserialize().unwrap();
        assert_eq!(decoded, payload);

        let id: i64 = event.data().get_as("widget_id").unwrap();
        assert_eq!(id, 9);
        let missing: Option<String> = event.data().get_as("absent").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_clone_shares_payload() {
        let event = Event::new(&WIDGET, json!({"widget_id": 1})).unwrap();
        let copy = event.clone();
        assert_eq!(copy.data(), event.data());
        assert_eq!(copy.data().to_value(), json!({"widget_id": 1}));
    }

    #[test]
    fn test_data_serializes_as_object() {
        let event = Event::new(&WIDGET, json!({"widget_id": 1})).unwrap();
        let encoded = serde_json::to_string(event.data()).unwrap();
        assert_eq!(encoded, r#"{"widget_id":1}"#);
    }
}
