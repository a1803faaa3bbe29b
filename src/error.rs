//! Error types for event-store

use thiserror::Error;

/// Errors that can occur in the event store
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The declared schema of an event type does not conform to JSON Schema draft-07
    #[error("Schema for event '{event_type}' is invalid")]
    InvalidSchema { event_type: String },

    /// Event data has the wrong shape (not a key-value mapping)
    #[error("Invalid data for event '{event_type}': {reason}")]
    InvalidData { event_type: String, reason: String },

    /// Event data does not match the declared schema
    #[error(
        "Data for event '{event_type}' does not match the defined schema: {}",
        .errors.join("; ")
    )]
    SchemaMismatch {
        event_type: String,
        errors: Vec<String>,
    },

    /// Publishing or subscribing to something that is not a registered event type
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A group of events is empty or not homogeneous
    #[error("Invalid events: {0}")]
    InvalidEvents(String),

    /// The consumer cannot be registered as a subscriber
    #[error("Invalid subscriber: {0}")]
    InvalidSubscriber(String),

    /// A dispatched job references an event type the registry does not know
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The consumer failed to accept a job
    #[error("Failed to enqueue job for '{worker}': {reason}")]
    Enqueue { worker: String, reason: String },

    /// A subscriber failed while handling an event
    #[error("Handler error: {0}")]
    Handler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Whether this error indicates a programming or boot-time mistake
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchema { .. }
                | Self::InvalidEvent(_)
                | Self::InvalidSubscriber(_)
                | Self::Config(_)
        )
    }
}

/// Result type alias for event store operations
pub type Result<T> = std::result::Result<T, EventStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_every_error() {
        let err = EventStoreError::SchemaMismatch {
            event_type: "WidgetCreatedEvent".to_string(),
            errors: vec!["first".to_string(), "second".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("WidgetCreatedEvent"));
        assert!(msg.contains("first; second"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(EventStoreError::InvalidSchema {
            event_type: "X".to_string()
        }
        .is_configuration());
        assert!(EventStoreError::InvalidSubscriber("x".to_string()).is_configuration());
        assert!(!EventStoreError::UnknownEventType("x".to_string()).is_configuration());
        assert!(!EventStoreError::Handler("x".to_string()).is_configuration());
    }
}
