//! Local job runner on tokio
//!
//! Executes a [`Subscriber`] in-process: every enqueued job becomes a
//! spawned task that waits out the job's delay and then calls
//! [`Subscriber::perform`]. Nothing is persisted; jobs still pending when
//! the runtime shuts down are lost.

use crate::error::{EventStoreError, Result};
use crate::queue::{AsyncConsumer, Job, Subscriber};
use crate::registry::EventRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// A job whose execution failed
#[derive(Debug, Clone)]
pub struct FailedJob {
    /// The job that failed
    pub job: Job,

    /// Rendered error
    pub error: String,
}

/// Failed jobs kept by default before the oldest are dropped
pub const DEFAULT_MAX_FAILURES: usize = 1000;

/// Runs subscriber jobs on the current tokio runtime
pub struct LocalQueue<S: Subscriber + 'static> {
    name: String,
    subscriber: Arc<S>,
    registry: Arc<EventRegistry>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<RwLock<Vec<FailedJob>>>,
    max_failures: usize,
}

impl<S: Subscriber + 'static> LocalQueue<S> {
    /// Create a runner for `subscriber`, resolving event types via `registry`
    pub fn new(name: impl Into<String>, subscriber: Arc<S>, registry: Arc<EventRegistry>) -> Self {
        Self {
            name: name.into(),
            subscriber,
            registry,
            handles: Mutex::new(Vec::new()),
            failures: Arc::new(RwLock::new(Vec::new())),
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }

    /// Keep at most `max_failures` failed jobs (0 = unbounded)
    pub fn with_max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// The wrapped subscriber
    pub fn subscriber(&self) -> &Arc<S> {
        &self.subscriber
    }

    /// Wait until every job spawned so far has finished
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.lock().await);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(worker = %self.name, error = %e, "Job task aborted");
                }
            }
        }
    }

    /// Number of spawned jobs that have not finished yet
    pub async fn pending(&self) -> usize {
        let mut handles = self.handles.lock().await;
        handles.retain(|handle| !handle.is_finished());
        handles.len()
    }

    /// Jobs that failed so far, oldest first
    pub async fn failures(&self) -> Vec<FailedJob> {
        self.failures.read().await.clone()
    }
}

#[async_trait]
impl<S: Subscriber + 'static> AsyncConsumer for LocalQueue<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| EventStoreError::Enqueue {
            worker: self.name.clone(),
            reason: format!("no tokio runtime: {}", e),
        })?;

        let subscriber = Arc::clone(&self.subscriber);
        let registry = Arc::clone(&self.registry);
        let failures = Arc::clone(&self.failures);
        let max_failures = self.max_failures;

        let handle = runtime.spawn(async move {
            if let Some(delay) = job.delay {
                tokio::time::sleep(delay).await;
            }

            match subscriber.perform(&registry, &job.args).await {
                Ok(()) => {
                    tracing::debug!(
                        worker = %job.worker,
                        job_id = %job.id,
                        event_type = %job.args.event_type,
                        "Job performed"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        worker = %job.worker,
                        job_id = %job.id,
                        event_type = %job.args.event_type,
                        error = %e,
                        "Job failed"
                    );
                    let mut failures = failures.write().await;
                    failures.push(FailedJob {
                        error: e.to_string(),
                        job,
                    });
                    if max_failures > 0 && failures.len() > max_failures {
                        let drain_count = failures.len() - max_failures;
                        failures.drain(..drain_count);
                    }
                }
            }
        });

        let mut handles = self.handles.lock().await;
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use crate::queue::JobArgs;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn issue_schema() -> Value {
        json!({
            "type": "object",
            "required": ["issue_id"],
            "properties": { "issue_id": { "type": "integer" } }
        })
    }

    static ISSUE_CLOSED: EventKind = EventKind::new("IssueClosedEvent", issue_schema);

    #[derive(Default)]
    struct ClosedIssues {
        ids: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Subscriber for ClosedIssues {
        async fn handle_event(&self, event: Event) -> Result<()> {
            self.ids.lock().await.push(event.data().get_as("issue_id")?);
            Ok(())
        }
    }

    fn queue() -> LocalQueue<ClosedIssues> {
        let registry = Arc::new(EventRegistry::with_kinds([&ISSUE_CLOSED]).unwrap());
        LocalQueue::new("ClosedIssuesWorker", Arc::new(ClosedIssues::default()), registry)
    }

    fn job(args: JobArgs, delay: Option<Duration>) -> Job {
        Job::new("ClosedIssuesWorker", args, delay)
    }

    #[tokio::test]
    async fn test_runs_job() {
        let queue = queue();
        let args = JobArgs {
            event_type: "IssueClosedEvent".to_string(),
            data: json!({"issue_id": 11}),
        };
        queue.enqueue(job(args, None)).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(*queue.subscriber().ids.lock().await, vec![11]);
        assert!(queue.failures().await.is_empty());
    }

    #[tokio::test]
    async fn test_runs_group_job() {
        let queue = queue();
        let args = JobArgs::group(
            "IssueClosedEvent",
            vec![json!({"issue_id": 1}), json!({"issue_id": 2})],
        );
        queue.enqueue_bulk(vec![job(args, None)]).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(*queue.subscriber().ids.lock().await, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honours_delay() {
        let queue = queue();
        let args = JobArgs {
            event_type: "IssueClosedEvent".to_string(),
            data: json!({"issue_id": 5}),
        };
        queue
            .enqueue(job(args, Some(Duration::from_secs(30))))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.subscriber().ids.lock().await.is_empty());

        queue.wait_idle().await;
        assert_eq!(*queue.subscriber().ids.lock().await, vec![5]);
    }

    #[tokio::test]
    async fn test_records_unknown_event_type() {
        let queue = queue();
        let args = JobArgs {
            event_type: "IssueReopenedEvent".to_string(),
            data: json!({"issue_id": 5}),
        };
        queue.enqueue(job(args, None)).await.unwrap();
        queue.wait_idle().await;

        let failures = queue.failures().await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error.contains("IssueReopenedEvent"));
        assert!(queue.subscriber().ids.lock().await.is_empty());
    }

    async fn settle(queue: &LocalQueue<ClosedIssues>, expected: usize) {
        for _ in 0..10_000 {
            let performed = queue.subscriber().ids.lock().await.len();
            let failed = queue.failures().await.len();
            if performed + failed >= expected && queue.handles.lock().await.iter().all(|h| h.is_finished()) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("jobs did not finish");
    }

    #[tokio::test]
    async fn test_finished_jobs_are_not_retained() {
        let queue = queue();
        for id in 0..500 {
            let args = JobArgs {
                event_type: "IssueClosedEvent".to_string(),
                data: json!({ "issue_id": id }),
            };
            queue.enqueue(job(args, None)).await.unwrap();
        }
        settle(&queue, 500).await;
        assert_eq!(queue.subscriber().ids.lock().await.len(), 500);

        let args = JobArgs {
            event_type: "IssueClosedEvent".to_string(),
            data: json!({"issue_id": 500}),
        };
        queue.enqueue(job(args, None)).await.unwrap();
        assert!(queue.handles.lock().await.len() <= 1);

        settle(&queue, 501).await;
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn test_failures_are_capped() {
        let queue = queue().with_max_failures(3);
        for id in 0..5 {
            let args = JobArgs {
                event_type: "IssueReopenedEvent".to_string(),
                data: json!({ "issue_id": id }),
            };
            queue.enqueue(job(args, None)).await.unwrap();
        }
        queue.wait_idle().await;

        assert_eq!(queue.failures().await.len(), 3);
    }

    #[test]
    fn test_enqueue_outside_runtime_fails() {
        let queue = queue();
        let args = JobArgs::group("IssueClosedEvent", vec![]);
        let result = futures::executor::block_on(queue.enqueue(job(args, None)));
        assert!(matches!(result, Err(EventStoreError::Enqueue { .. })));
    }
}
