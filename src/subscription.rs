//! Subscriptions — bind one consumer to one event type
//!
//! A subscription decides whether an event reaches its consumer (the
//! optional condition), shapes the job (delay, group size, scheduling
//! batches) and hands it over. Whatever goes wrong on the way, whether
//! the condition panics or the consumer rejects or panics, is reported
//! to the store's [`ErrorTracker`] and never reaches the publisher.
//!
//! # Panic Safety
//!
//! Conditions run under [`std::panic::catch_unwind`], enqueue futures under
//! [`FutureExt::catch_unwind`]. A panic is tracked like any other error.

use crate::config::StoreConfig;
use crate::event::Event;
use crate::queue::{AsyncConsumer, Job, JobArgs};
use crate::tracking::{ErrorTracker, TrackedError};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether an event is dispatched to a subscription
pub type Condition = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// What a subscription did with an event or group of events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Jobs were handed to the consumer
    Enqueued { jobs: usize },
    /// The condition filtered everything out
    Skipped,
    /// The condition or the enqueue failed; the error was tracked
    Failed,
}

/// A consumer registered for one event type
pub struct Subscription {
    consumer: Arc<dyn AsyncConsumer>,
    condition: Option<Condition>,
    delay: Option<Duration>,
    group_size: usize,
    config: StoreConfig,
    tracker: Arc<dyn ErrorTracker>,
}

impl Subscription {
    pub(crate) fn new(
        consumer: Arc<dyn AsyncConsumer>,
        condition: Option<Condition>,
        delay: Option<Duration>,
        group_size: usize,
        config: StoreConfig,
        tracker: Arc<dyn ErrorTracker>,
    ) -> Self {
        Self {
            consumer,
            condition,
            delay,
            group_size,
            config,
            tracker,
        }
    }

    /// Name of the bound consumer
    pub fn consumer_name(&self) -> &str {
        self.consumer.name()
    }

    /// Delay applied to every job of this subscription
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Events per job in group dispatch
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Whether dispatch is conditional
    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Dispatch a single event
    pub async fn consume_event(&self, event: &Event) -> DispatchOutcome {
        match self.condition_met(event) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    subscriber = %self.consumer_name(),
                    event_type = event.name(),
                    "Condition not met, event skipped"
                );
                return DispatchOutcome::Skipped;
            }
            Err(error) => {
                self.report(event.name(), event.data().to_value(), error).await;
                return DispatchOutcome::Failed;
            }
        }

        let job = Job::new(self.consumer_name(), JobArgs::single(event), self.delay);
        match guarded(self.consumer.enqueue(job)).await {
            Ok(()) => {
                tracing::debug!(
                    subscriber = %self.consumer_name(),
                    event_type = event.name(),
                    "Event dispatched"
                );
                DispatchOutcome::Enqueued { jobs: 1 }
            }
            Err(error) => {
                self.report(event.name(), event.data().to_value(), error).await;
                DispatchOutcome::Failed
            }
        }
    }

    /// Dispatch a group of events of the same type in one bulk enqueue
    ///
    /// Matching payloads are chunked into jobs of `group_size` events. When
    /// there are more jobs than one scheduling batch, or the subscription has
    /// a delay, jobs are spread out: batch `n` runs `n` batch delays after
    /// the first. A group mixing event types is tracked and rejected
    /// without enqueueing anything.
    pub async fn consume_events(&self, events: &[Event]) -> DispatchOutcome {
        let Some(first) = events.first() else {
            return DispatchOutcome::Skipped;
        };
        let event_type = first.name();

        if let Some(stray) = events.iter().find(|e| !e.is_kind(first.kind())) {
            let error = format!(
                "Events in a group must all be '{}', found '{}'",
                event_type,
                stray.name()
            );
            tracing::warn!(
                subscriber = %self.consumer_name(),
                event_type,
                "Mixed event group rejected"
            );
            self.report(event_type, group_data(events), error).await;
            return DispatchOutcome::Failed;
        }

        let mut matched = Vec::with_capacity(events.len());
        for event in events {
            match self.condition_met(event) {
                Ok(true) => matched.push(event.data().to_value()),
                Ok(false) => {}
                Err(error) => {
                    self.report(event_type, group_data(events), error).await;
                    return DispatchOutcome::Failed;
                }
            }
        }

        if matched.is_empty() {
            tracing::debug!(
                subscriber = %self.consumer_name(),
                event_type,
                count = events.len(),
                "Condition not met by any event, group skipped"
            );
            return DispatchOutcome::Skipped;
        }

        let groups: Vec<Vec<Value>> = matched
            .chunks(self.group_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let total = groups.len();
        let jobs: Vec<Job> = groups
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                Job::new(
                    self.consumer_name(),
                    JobArgs::group(event_type, data),
                    self.group_delay(index, total),
                )
            })
            .collect();

        match guarded(self.consumer.enqueue_bulk(jobs)).await {
            Ok(()) => {
                tracing::debug!(
                    subscriber = %self.consumer_name(),
                    event_type,
                    events = matched.len(),
                    jobs = total,
                    "Event group dispatched"
                );
                DispatchOutcome::Enqueued { jobs: total }
            }
            Err(error) => {
                self.report(event_type, group_data(events), error).await;
                DispatchOutcome::Failed
            }
        }
    }

    fn condition_met(&self, event: &Event) -> std::result::Result<bool, String> {
        match &self.condition {
            None => Ok(true),
            Some(condition) => std::panic::catch_unwind(AssertUnwindSafe(|| condition(event)))
                .map_err(|panic| panic_message(panic.as_ref())),
        }
    }

    fn group_delay(&self, index: usize, total: usize) -> Option<Duration> {
        let batch_size = self.config.scheduling_batch_size.max(1);
        if total <= batch_size && self.delay.is_none() {
            return None;
        }

        let base = self
            .delay
            .unwrap_or_else(|| self.config.scheduling_initial_delay());
        let batch = u32::try_from(index / batch_size).unwrap_or(u32::MAX);
        Some(base.saturating_add(self.config.scheduling_batch_delay().saturating_mul(batch)))
    }

    async fn report(&self, event_type: &str, event_data: Value, error: String) {
        self.tracker
            .track(TrackedError::new(
                self.consumer_name(),
                event_type,
                event_data,
                error,
            ))
            .await;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("consumer", &self.consumer_name())
            .field("conditional", &self.has_condition())
            .field("delay", &self.delay)
            .field("group_size", &self.group_size)
            .finish()
    }
}

async fn guarded<F>(enqueue: F) -> std::result::Result<(), String>
where
    F: Future<Output = crate::error::Result<()>>,
{
    match AssertUnwindSafe(enqueue).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn group_data(events: &[Event]) -> Value {
    Value::Array(events.iter().map(|e| e.data().to_value()).collect())
}
