//! Event store — routing table and publish entry point
//!
//! A store is configured once, at boot, through a [`StoreBuilder`]. Building
//! it locks the routing table: [`Store`] has no method that adds or removes
//! subscriptions, so every task that publishes through a shared
//! `Arc<Store>` reads the same table without synchronization.
//!
//! ```rust
//! use event_store::{Event, EventKind, EventRegistry, MemoryQueue, Store, SubscribeOptions};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! fn schema() -> Value {
//!     json!({"type": "object", "required": ["widget_id"]})
//! }
//! static WIDGET_CREATED: EventKind = EventKind::new("WidgetCreatedEvent", schema);
//!
//! # async fn example() -> event_store::Result<()> {
//! let registry = Arc::new(EventRegistry::with_kinds([&WIDGET_CREATED])?);
//! let notify = Arc::new(MemoryQueue::new("NotifyWorker"));
//!
//! let store = Store::new(registry, |store| {
//!     store.subscribe(notify.clone(), SubscribeOptions::to(&WIDGET_CREATED))?;
//!     Ok(())
//! })?;
//!
//! store
//!     .publish(&Event::new(&WIDGET_CREATED, json!({"widget_id": 42}))?)
//!     .await?;
//! assert_eq!(notify.len().await, 1);
//! # Ok(())
//! # }
//! ```
//!
//! Once built, the store cannot be subscribed to:
//!
//! ```rust,compile_fail
//! use event_store::{EventRegistry, MemoryQueue, Store, SubscribeOptions};
//! use std::sync::Arc;
//!
//! let store = Store::builder(Arc::new(EventRegistry::new())).build().unwrap();
//! store.subscribe(Arc::new(MemoryQueue::new("LateWorker")), SubscribeOptions::to_all([]));
//! ```

use crate::config::StoreConfig;
use crate::error::{EventStoreError, Result};
use crate::event::{Event, EventKind};
use crate::queue::AsyncConsumer;
use crate::registry::EventRegistry;
use crate::subscription::{Condition, DispatchOutcome, Subscription};
use crate::tracking::{ErrorTracker, TracingErrorTracker};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What to subscribe to, and how
#[derive(Default)]
pub struct SubscribeOptions {
    to: Vec<&'static EventKind>,
    condition: Option<Condition>,
    delay: Option<Duration>,
    group_size: Option<usize>,
}

impl SubscribeOptions {
    /// Subscribe to a single event type
    pub fn to(kind: &'static EventKind) -> Self {
        Self {
            to: vec![kind],
            ..Default::default()
        }
    }

    /// Subscribe to several event types with the same options
    pub fn to_all(kinds: impl IntoIterator<Item = &'static EventKind>) -> Self {
        Self {
            to: kinds.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Add another event type
    pub fn and(mut self, kind: &'static EventKind) -> Self {
        self.to.push(kind);
        self
    }

    /// Only dispatch events for which `condition` holds
    pub fn when(mut self, condition: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Delay every job by `delay`
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Events per job in group dispatch
    pub fn group_size(mut self, group_size: usize) -> Self {
        self.group_size = Some(group_size);
        self
    }
}

struct Registration {
    consumer: Arc<dyn AsyncConsumer>,
    condition: Option<Condition>,
    delay: Option<Duration>,
    group_size: Option<usize>,
}

/// Configuring phase of a [`Store`]
pub struct StoreBuilder {
    registry: Arc<EventRegistry>,
    config: StoreConfig,
    tracker: Arc<dyn ErrorTracker>,
    registrations: HashMap<&'static str, Vec<Registration>>,
}

impl StoreBuilder {
    fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            config: StoreConfig::default(),
            tracker: Arc::new(TracingErrorTracker),
            registrations: HashMap::new(),
        }
    }

    /// Use a custom configuration
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Report dispatch failures to `tracker` instead of the log
    pub fn with_error_tracker(mut self, tracker: Arc<dyn ErrorTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Register `consumer` for the event types named in `options`
    ///
    /// Fails with `InvalidEvent` for event types missing from the store's
    /// registry, `InvalidSubscriber` for a consumer without a name, and
    /// `Config` for a zero group size. On failure nothing is registered.
    pub fn subscribe(
        &mut self,
        consumer: Arc<dyn AsyncConsumer>,
        options: SubscribeOptions,
    ) -> Result<&mut Self> {
        if options.to.is_empty() {
            return Err(EventStoreError::InvalidEvent(format!(
                "Subscriber '{}' names no event type to subscribe to",
                consumer.name()
            )));
        }
        for kind in &options.to {
            self.validate_subscription(consumer.as_ref(), kind)?;
        }
        if options.group_size == Some(0) {
            return Err(EventStoreError::Config(format!(
                "Group size for subscriber '{}' must be >= 1",
                consumer.name()
            )));
        }

        for kind in options.to {
            tracing::info!(
                subscriber = %consumer.name(),
                event_type = kind.name(),
                conditional = options.condition.is_some(),
                "Subscription registered"
            );
            self.registrations
                .entry(kind.name())
                .or_default()
                .push(Registration {
                    consumer: Arc::clone(&consumer),
                    condition: options.condition.clone(),
                    delay: options.delay,
                    group_size: options.group_size,
                });
        }

        Ok(self)
    }

    /// Lock the routing table
    pub fn build(self) -> Result<Store> {
        self.config.validate()?;

        let config = self.config;
        let tracker = self.tracker;
        let subscriptions: HashMap<&'static str, Box<[Subscription]>> = self
            .registrations
            .into_iter()
            .map(|(event_type, registrations)| {
                let subscriptions = registrations
                    .into_iter()
                    .map(|r| {
                        Subscription::new(
                            r.consumer,
                            r.condition,
                            r.delay,
                            r.group_size.unwrap_or(config.default_group_size),
                            config.clone(),
                            Arc::clone(&tracker),
                        )
                    })
                    .collect();
                (event_type, subscriptions)
            })
            .collect();

        let store = Store {
            registry: self.registry,
            config,
            subscriptions,
        };

        tracing::info!(
            event_types = store.subscriptions.len(),
            subscriptions = store.subscription_count(),
            "Event store locked"
        );

        Ok(store)
    }

    fn validate_subscription(&self, consumer: &dyn AsyncConsumer, kind: &EventKind) -> Result<()> {
        if !self.registry.contains(kind) {
            return Err(EventStoreError::InvalidEvent(format!(
                "Event being subscribed to is not a registered event type: got '{}'",
                kind.name()
            )));
        }
        if consumer.name().trim().is_empty() {
            return Err(EventStoreError::InvalidSubscriber(format!(
                "Subscriber for '{}' has no name",
                kind.name()
            )));
        }
        Ok(())
    }
}

/// Per-subscription outcomes of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Subscriptions that enqueued jobs
    pub enqueued: usize,
    /// Subscriptions whose condition filtered the event(s) out
    pub skipped: usize,
    /// Subscriptions whose dispatch failed (tracked, not raised)
    pub failed: usize,
}

impl PublishSummary {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Enqueued { .. } => self.enqueued += 1,
            DispatchOutcome::Skipped => self.skipped += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
    }

    /// Number of subscriptions that were attempted
    pub fn attempted(&self) -> usize {
        self.enqueued + self.skipped + self.failed
    }
}

/// Locked event store
pub struct Store {
    registry: Arc<EventRegistry>,
    config: StoreConfig,
    subscriptions: HashMap<&'static str, Box<[Subscription]>>,
}

impl Store {
    /// Start configuring a store whose event types come from `registry`
    pub fn builder(registry: Arc<EventRegistry>) -> StoreBuilder {
        StoreBuilder::new(registry)
    }

    /// Configure a store with default settings in one block, then lock it
    pub fn new(
        registry: Arc<EventRegistry>,
        configure: impl FnOnce(&mut StoreBuilder) -> Result<()>,
    ) -> Result<Self> {
        let mut builder = Self::builder(registry);
        configure(&mut builder)?;
        builder.build()
    }

    /// Publish one event to every subscription of its type
    ///
    /// Subscriptions are attempted in registration order. Publishing an
    /// event nobody subscribed to is a no-op. Dispatch failures are tracked
    /// and never returned; the only error is an unregistered event type.
    pub async fn publish(&self, event: &Event) -> Result<PublishSummary> {
        if !self.registry.contains(event.kind()) {
            return Err(EventStoreError::InvalidEvent(format!(
                "Event being published is not a registered event type: got '{}'",
                event.name()
            )));
        }

        let mut summary = PublishSummary::default();
        for subscription in self.subscriptions_for(event.kind()) {
            summary.record(subscription.consume_event(event).await);
        }

        tracing::debug!(
            event_type = event.name(),
            enqueued = summary.enqueued,
            skipped = summary.skipped,
            failed = summary.failed,
            "Event published"
        );

        Ok(summary)
    }

    /// Publish a group of events of exactly the same type
    ///
    /// Each subscription receives the whole group once and may enqueue it
    /// as a handful of jobs instead of one per event. Fails with
    /// `InvalidEvents`, dispatching nothing, for an empty or mixed group.
    pub async fn publish_group(&self, events: &[Event]) -> Result<PublishSummary> {
        let Some(first) = events.first() else {
            return Err(EventStoreError::InvalidEvents(
                "Cannot publish an empty group of events".to_string(),
            ));
        };

        if let Some(other) = events.iter().find(|e| !e.is_kind(first.kind())) {
            return Err(EventStoreError::InvalidEvents(format!(
                "Events being published must all be of the same type: got '{}' and '{}'",
                first.name(),
                other.name()
            )));
        }

        if !self.registry.contains(first.kind()) {
            return Err(EventStoreError::InvalidEvents(format!(
                "Events being published are not a registered event type: got '{}'",
                first.name()
            )));
        }

        let mut summary = PublishSummary::default();
        for subscription in self.subscriptions_for(first.kind()) {
            summary.record(subscription.consume_events(events).await);
        }

        tracing::debug!(
            event_type = first.name(),
            count = events.len(),
            enqueued = summary.enqueued,
            skipped = summary.skipped,
            failed = summary.failed,
            "Event group published"
        );

        Ok(summary)
    }

    /// Subscriptions for an event type, in registration order
    pub fn subscriptions_for(&self, kind: &EventKind) -> &[Subscription] {
        if !self.registry.contains(kind) {
            return &[];
        }
        self.subscriptions
            .get(kind.name())
            .map(|subscriptions| &subscriptions[..])
            .unwrap_or(&[])
    }

    /// Total number of subscriptions across all event types
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(|s| s.len()).sum()
    }

    /// The registry event types are resolved against
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// The store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("event_types", &self.registry.names())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
