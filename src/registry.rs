//! Event registry — resolve event type names to their declarations
//!
//! Jobs carry the event type as a string. Consumers rebuild the typed
//! [`Event`] by looking the name up here, so a stale or misspelled name in a
//! job payload fails with `UnknownEventType` instead of being guessed at.
//! The store also uses the registry to reject subscriptions and publishes
//! for event types nobody declared.

use crate::error::{EventStoreError, Result};
use crate::event::{Event, EventKind};
use serde_json::Value;
use std::collections::HashMap;

/// Mapping from event type name to its [`EventKind`]
#[derive(Debug, Default)]
pub struct EventRegistry {
    kinds: HashMap<&'static str, &'static EventKind>,
}

impl EventRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding all the given kinds
    pub fn with_kinds(kinds: impl IntoIterator<Item = &'static EventKind>) -> Result<Self> {
        let mut registry = Self::new();
        for kind in kinds {
            registry.register(kind)?;
        }
        Ok(registry)
    }

    /// Register an event type
    ///
    /// Re-registering the same kind is a no-op; a different kind with a
    /// name that is already taken is rejected.
    pub fn register(&mut self, kind: &'static EventKind) -> Result<()> {
        if kind.name().trim().is_empty() {
            return Err(EventStoreError::Config(
                "Event type name cannot be empty".to_string(),
            ));
        }

        match self.kinds.get(kind.name()) {
            Some(existing) if existing.is(kind) => Ok(()),
            Some(_) => Err(EventStoreError::Config(format!(
                "Event type '{}' is already registered",
                kind.name()
            ))),
            None => {
                self.kinds.insert(kind.name(), kind);
                tracing::debug!(event_type = kind.name(), "Event type registered");
                Ok(())
            }
        }
    }

    /// Resolve an event type by name
    pub fn get(&self, name: &str) -> Result<&'static EventKind> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| EventStoreError::UnknownEventType(name.to_string()))
    }

    /// Whether this exact kind is registered
    pub fn contains(&self, kind: &EventKind) -> bool {
        self.kinds
            .get(kind.name())
            .is_some_and(|registered| registered.is(kind))
    }

    /// Rebuild a validated event from a type name and raw payload
    pub fn reconstruct(&self, name: &str, data: Value) -> Result<Event> {
        let kind = self.get(name)?;
        Event::new(kind, data)
    }

    /// Registered event type names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.kinds.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered event types
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no event types are registered
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
