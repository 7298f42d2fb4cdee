//! Queue collaborator abstraction and adapters.
//!
//! The reconciler never talks to a backend directly; it goes through
//! [`JobQueue`], which exposes exactly the capabilities a pass needs:
//! listing jobs by state, enqueueing, rewriting a payload, removing, and
//! releasing the handle.
//!
//! ## Adapters
//!
//! - `InMemoryJobQueue`: process-local queue for tests and dry runs
//! - `RedisJobQueue` (feature `redis`): hash-per-job layout with one set per state

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_queue;

use jobsync_core::{JobIdentity, JobState, JsonMap, NewJob, QueuedJob};
use thiserror::Error;

pub use in_memory::{InMemoryJobQueue, JobCounts};
#[cfg(feature = "redis")]
pub use redis_queue::RedisJobQueue;

/// Failure reported by a queue backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobIdentity),
    #[error("job already exists: {0}")]
    AlreadyExists(JobIdentity),
    #[error("queue is closed")]
    Closed,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Capabilities a reconciliation pass consumes from a job queue.
///
/// Implementations must be safe to call concurrently; the executor issues
/// up to its concurrency limit of these calls at once, each targeting a
/// different identity.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// List jobs currently in any of `states`.
    async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<QueuedJob>, QueueError>;

    /// Enqueue a new job.
    async fn add_job(&self, job: NewJob) -> Result<QueuedJob, QueueError>;

    /// Enqueue several jobs. Stops at the first failure.
    async fn add_jobs_bulk(&self, jobs: Vec<NewJob>) -> Result<Vec<QueuedJob>, QueueError> {
        let mut added = Vec::with_capacity(jobs.len());
        for job in jobs {
            added.push(self.add_job(job).await?);
        }
        Ok(added)
    }

    /// Overwrite the payload of a live job, keeping its timestamp and state.
    async fn update_payload(&self, job: &QueuedJob, payload: JsonMap) -> Result<(), QueueError>;

    /// Remove a job.
    async fn remove_job(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Release connections held by this handle.
    async fn close(&self) -> Result<(), QueueError>;
}
