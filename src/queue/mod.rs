//! Consumer contracts — the hand-off between the store and a job system
//!
//! The store never runs handlers itself. Each subscription turns an event
//! into a [`Job`] and passes it to an [`AsyncConsumer`], whose only duty is
//! to schedule the job for later, out-of-band execution. What runs the job
//! is up to the consumer:
//!
//! - **memory** — [`MemoryQueue`](memory::MemoryQueue) records jobs, for tests
//! - **local** — [`LocalQueue`](local::LocalQueue) runs a [`Subscriber`] on tokio tasks
//!
//! A durable job system plugs in by implementing `AsyncConsumer` over its
//! own client.

use crate::error::Result;
use crate::event::Event;
use crate::registry::EventRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub mod local;
pub mod memory;

/// Arguments of a dispatched job, as they cross the queue
///
/// `data` is a single payload object for single dispatch, or an array of
/// payload objects for group dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobArgs {
    /// Event type name, resolved through the [`EventRegistry`] on the consumer side
    pub event_type: String,

    /// Event payload(s)
    pub data: Value,
}

impl JobArgs {
    /// Arguments for a single event
    pub fn single(event: &Event) -> Self {
        Self {
            event_type: event.name().to_string(),
            data: event.data().to_value(),
        }
    }

    /// Arguments for a group of payloads of the same event type
    pub fn group(event_type: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Value::Array(data),
        }
    }

    /// The individual payloads carried by this job
    pub fn payloads(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(items) => items.clone(),
            single => vec![single.clone()],
        }
    }
}

/// A job handed to a consumer
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier (job-<uuid>)
    pub id: String,

    /// Name of the consumer the job is for
    pub worker: String,

    /// Job arguments
    pub args: JobArgs,

    /// Run no earlier than this long after enqueueing
    pub delay: Option<Duration>,

    /// When the job was created
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job with an auto-generated id
    pub fn new(worker: impl Into<String>, args: JobArgs, delay: Option<Duration>) -> Self {
        Self {
            id: format!("job-{}", uuid::Uuid::new_v4()),
            worker: worker.into(),
            args,
            delay,
            enqueued_at: Utc::now(),
        }
    }
}

/// Something that can schedule jobs for asynchronous execution
///
/// `enqueue` must be fire-and-forget: it returns once the job is accepted,
/// never after it ran.
#[async_trait]
pub trait AsyncConsumer: Send + Sync {
    /// Consumer name, used as the job's worker and in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Schedule a single job
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Schedule several jobs in one call
    ///
    /// Default implementation enqueues them one by one. Consumers backed by
    /// a queue with bulk push should override this.
    async fn enqueue_bulk(&self, jobs: Vec<Job>) -> Result<()> {
        for job in jobs {
            self.enqueue(job).await?;
        }
        Ok(())
    }
}

/// Handler side of a subscription
///
/// Implement `handle_event`; `perform` is the job entry point that turns
/// raw job arguments back into validated events.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Handle one event
    async fn handle_event(&self, event: Event) -> Result<()>;

    /// Run a dispatched job
    ///
    /// Fails with `UnknownEventType` when the job names an event type the
    /// registry doesn't know, and with the usual construction errors when a
    /// payload no longer matches its schema. Events of a group job are
    /// handled in order; the first failure aborts the job.
    async fn perform(&self, registry: &EventRegistry, args: &JobArgs) -> Result<()> {
        let kind = registry.get(&args.event_type)?;
        for data in args.payloads() {
            let event = Event::new(kind, data)?;
            self.handle_event(event).await?;
        }
        Ok(())
    }
}
