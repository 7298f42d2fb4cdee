//! Infrastructure layer: queue adapters and reconciliation passes.

pub mod queue;
pub mod sync;

pub use queue::{InMemoryJobQueue, JobCounts, JobQueue, QueueError};
#[cfg(feature = "redis")]
pub use queue::RedisJobQueue;
pub use sync::{
    dry_run, reconcile, ApplyFailure, ApplyFailures, ReconcileOptions, ReconcileReport, SyncError,
    DEFAULT_CONCURRENCY,
};
