//! Store configuration
//!
//! Tunes how group publishes are turned into jobs. All fields have
//! defaults, so an empty JSON object is a valid configuration.

use crate::error::{EventStoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Events per job for subscriptions that don't set a group size
pub const DEFAULT_GROUP_SIZE: usize = 10;

/// Jobs per scheduling batch before group dispatch starts spreading them out
pub const DEFAULT_SCHEDULING_BATCH_SIZE: usize = 100;

/// Delay between consecutive scheduling batches
pub const DEFAULT_SCHEDULING_BATCH_DELAY_MS: u64 = 10_000;

/// Delay of the first scheduling batch when the subscription has none
pub const DEFAULT_SCHEDULING_INITIAL_DELAY_MS: u64 = 1_000;

/// Configuration for a [`Store`](crate::Store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Events per job in group dispatch, unless the subscription overrides it
    pub default_group_size: usize,

    /// Maximum jobs scheduled at the same instant by one group dispatch
    pub scheduling_batch_size: usize,

    /// Spacing between scheduling batches, in milliseconds
    pub scheduling_batch_delay_ms: u64,

    /// Delay applied to the first batch when the subscription has no delay
    pub scheduling_initial_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_group_size: DEFAULT_GROUP_SIZE,
            scheduling_batch_size: DEFAULT_SCHEDULING_BATCH_SIZE,
            scheduling_batch_delay_ms: DEFAULT_SCHEDULING_BATCH_DELAY_MS,
            scheduling_initial_delay_ms: DEFAULT_SCHEDULING_INITIAL_DELAY_MS,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EventStoreError::Config(format!("Failed to parse store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EventStoreError::Config(format!(
                "Failed to read store config {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "Store config loaded");
        Ok(config)
    }

    /// Reject values that would make group dispatch meaningless
    pub fn validate(&self) -> Result<()> {
        if self.default_group_size == 0 {
            return Err(EventStoreError::Config(
                "defaultGroupSize must be >= 1".to_string(),
            ));
        }
        if self.scheduling_batch_size == 0 {
            return Err(EventStoreError::Config(
                "schedulingBatchSize must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Spacing between scheduling batches
    pub fn scheduling_batch_delay(&self) -> Duration {
        Duration::from_millis(self.scheduling_batch_delay_ms)
    }

    /// Delay of the first scheduling batch
    pub fn scheduling_initial_delay(&self) -> Duration {
        Duration::from_millis(self.scheduling_initial_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.default_group_size, 10);
        assert_eq!(config.scheduling_batch_size, 100);
        assert_eq!(config.scheduling_batch_delay(), Duration::from_secs(10));
        assert_eq!(config.scheduling_initial_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config =
            StoreConfig::from_json_str(r#"{"defaultGroupSize": 25, "schedulingBatchDelayMs": 500}"#)
                .unwrap();
        assert_eq!(config.default_group_size, 25);
        assert_eq!(config.scheduling_batch_delay(), Duration::from_millis(500));
        assert_eq!(config.scheduling_batch_size, 100);
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let err = StoreConfig::from_json_str(r#"{"defaultGroupSize": 0}"#).unwrap_err();
        assert!(matches!(err, EventStoreError::Config(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = StoreConfig {
            scheduling_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(StoreConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("event-store-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.json");
        std::fs::write(&path, r#"{"schedulingBatchSize": 50}"#).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.scheduling_batch_size, 50);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_missing_file() {
        let err = StoreConfig::from_file("/tmp/nonexistent-event-store-config.json").unwrap_err();
        assert!(matches!(err, EventStoreError::Config(_)));
    }
}
