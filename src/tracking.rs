//! Error tracking — where suppressed dispatch failures are reported
//!
//! A subscription never lets a failing condition or enqueue escape into
//! the publisher. Instead the failure is handed to an `ErrorTracker` along
//! with the event it was dispatching, so it stays diagnosable.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A dispatch failure with the context needed to diagnose it
#[derive(Debug, Clone)]
pub struct TrackedError {
    /// Name of the consumer the event was being dispatched to
    pub subscriber: String,

    /// Event type name
    pub event_type: String,

    /// Event payload (an array of payloads for group dispatch)
    pub event_data: Value,

    /// Rendered error
    pub error: String,

    /// Unix timestamp in milliseconds when the error was tracked
    pub tracked_at: u64,
}

impl TrackedError {
    /// Create a new tracked error stamped with the current time
    pub fn new(
        subscriber: impl Into<String>,
        event_type: impl Into<String>,
        event_data: Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            subscriber: subscriber.into(),
            event_type: event_type.into(),
            event_data,
            error: error.into(),
            tracked_at: now_millis(),
        }
    }
}

/// Sink for dispatch failures
#[async_trait]
pub trait ErrorTracker: Send + Sync {
    /// Record a failure; must not fail itself
    async fn track(&self, error: TrackedError);
}

/// Reports failures through `tracing` at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorTracker;

#[async_trait]
impl ErrorTracker for TracingErrorTracker {
    async fn track(&self, error: TrackedError) {
        tracing::error!(
            subscriber = %error.subscriber,
            event_type = %error.event_type,
            event_data = %error.event_data,
            error = %error.error,
            "Event dispatch failed"
        );
    }
}

/// In-memory tracker for development and testing
///
/// Keeps the most recent failures up to a configurable capacity.
pub struct MemoryErrorTracker {
    errors: Arc<RwLock<Vec<TrackedError>>>,
    max_errors: usize,
}

impl MemoryErrorTracker {
    /// Create a tracker keeping at most `max_errors` entries (0 = unbounded)
    pub fn new(max_errors: usize) -> Self {
        Self {
            errors: Arc::new(RwLock::new(Vec::new())),
            max_errors,
        }
    }

    /// Number of tracked errors currently held
    pub async fn count(&self) -> usize {
        self.errors.read().await.len()
    }

    /// Most recent tracked errors, newest first
    pub async fn list(&self, limit: usize) -> Vec<TrackedError> {
        let errors = self.errors.read().await;
        errors.iter().rev().take(limit).cloned().collect()
    }

    /// Forget all tracked errors
    pub async fn clear(&self) {
        self.errors.write().await.clear();
    }
}

impl Default for MemoryErrorTracker {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ErrorTracker for MemoryErrorTracker {
    async fn track(&self, error: TrackedError) {
        tracing::warn!(
            subscriber = %error.subscriber,
            event_type = %error.event_type,
            error = %error.error,
            "Event dispatch failed"
        );

        let mut errors = self.errors.write().await;
        errors.push(error);

        if self.max_errors > 0 && errors.len() > self.max_errors {
            let drain_count = errors.len() - self.max_errors;
            errors.drain(..drain_count);
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
