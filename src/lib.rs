//! # event-store
//!
//! Schema-validated in-process domain events with fan-out dispatch to
//! asynchronous job consumers.
//!
//! ## Overview
//!
//! Code that changes domain state publishes an event ("a project was
//! created") without knowing who reacts to it. The store routes the event
//! to every subscription registered for its type; each subscription hands
//! it to a consumer that schedules a background job. One failing consumer
//! never keeps the others from receiving the event.
//!
//! ## Quick Start
//!
//! ```rust
//! use event_store::{Event, EventKind, EventRegistry, MemoryQueue, Store, SubscribeOptions};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! fn widget_created_schema() -> Value {
//!     json!({
//!         "type": "object",
//!         "required": ["widget_id"],
//!         "properties": { "widget_id": { "type": "integer" } }
//!     })
//! }
//!
//! static WIDGET_CREATED: EventKind = EventKind::new("WidgetCreatedEvent", widget_created_schema);
//!
//! # async fn example() -> event_store::Result<()> {
//! let registry = Arc::new(EventRegistry::with_kinds([&WIDGET_CREATED])?);
//! let notify = Arc::new(MemoryQueue::new("NotifyWorker"));
//!
//! // Configure once at boot; the store is locked when this returns
//! let store = Store::new(registry, |store| {
//!     store.subscribe(
//!         notify.clone(),
//!         SubscribeOptions::to(&WIDGET_CREATED).when(|event| event.data()["widget_id"] != 0),
//!     )?;
//!     Ok(())
//! })?;
//!
//! let event = Event::new(&WIDGET_CREATED, json!({"widget_id": 42}))?;
//! store.publish(&event).await?;
//!
//! let jobs = notify.jobs().await;
//! assert_eq!(jobs[0].args.event_type, "WidgetCreatedEvent");
//! assert_eq!(jobs[0].args.data, json!({"widget_id": 42}));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventKind** — static declaration of an event type and its JSON schema
//! - **Event** — immutable payload validated against its kind's schema
//! - **EventRegistry** — name → kind mapping, used to rebuild events from jobs
//! - **Store** — locked routing table with `publish` / `publish_group`
//! - **Subscription** — condition, delay and grouping for one consumer
//! - **AsyncConsumer** trait — where jobs are handed off
//! - **Subscriber** trait — job-side handler that receives rebuilt events
//! - **ErrorTracker** trait — where suppressed dispatch failures go

pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod store;
pub mod subscription;
pub mod tracking;

// Re-export core types
pub use config::StoreConfig;
pub use error::{EventStoreError, Result};
pub use event::{Event, EventData, EventKind};
pub use queue::{AsyncConsumer, Job, JobArgs, Subscriber};
pub use registry::EventRegistry;
pub use store::{PublishSummary, Store, StoreBuilder, SubscribeOptions};
pub use subscription::{Condition, DispatchOutcome, Subscription};
pub use tracking::{ErrorTracker, MemoryErrorTracker, TrackedError, TracingErrorTracker};

// Re-export queues for convenience
pub use queue::local::{FailedJob, LocalQueue};
pub use queue::memory::MemoryQueue;
