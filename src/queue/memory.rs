//! In-memory job queue
//!
//! Records every job it is given instead of running it. Useful for tests
//! and for asserting what a publish dispatched. Can be told to reject jobs
//! to exercise failure isolation.

use crate::error::{EventStoreError, Result};
use crate::queue::{AsyncConsumer, Job};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Job queue that keeps enqueued jobs in memory
pub struct MemoryQueue {
    name: String,
    jobs: RwLock<Vec<Job>>,
    batches: RwLock<Vec<Vec<Job>>>,
    failure: RwLock<Option<String>>,
}

impl MemoryQueue {
    /// Create an accepting queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: RwLock::new(Vec::new()),
            batches: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
        }
    }

    /// Create a queue that rejects every job with `reason`
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failure: RwLock::new(Some(reason.into())),
            ..Self::new(name)
        }
    }

    /// Start or stop rejecting jobs
    pub async fn set_failure(&self, reason: Option<String>) {
        *self.failure.write().await = reason;
    }

    /// All accepted jobs, in enqueue order
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    /// Jobs accepted through `enqueue_bulk`, one entry per call
    pub async fn batches(&self) -> Vec<Vec<Job>> {
        self.batches.read().await.clone()
    }

    /// Number of accepted jobs
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether no job was accepted
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Forget all recorded jobs
    pub async fn clear(&self) {
        self.jobs.write().await.clear();
        self.batches.write().await.clear();
    }

    async fn check_accepting(&self) -> Result<()> {
        match self.failure.read().await.as_ref() {
            Some(reason) => Err(EventStoreError::Enqueue {
                worker: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AsyncConsumer for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        self.check_accepting().await?;

        tracing::debug!(
            worker = %self.name,
            job_id = %job.id,
            event_type = %job.args.event_type,
            "Job enqueued"
        );
        self.jobs.write().await.push(job);
        Ok(())
    }

    async fn enqueue_bulk(&self, jobs: Vec<Job>) -> Result<()> {
        self.check_accepting().await?;

        tracing::debug!(worker = %self.name, count = jobs.len(), "Jobs enqueued in bulk");
        self.jobs.write().await.extend(jobs.iter().cloned());
        self.batches.write().await.push(jobs);
        Ok(())
    }
}
