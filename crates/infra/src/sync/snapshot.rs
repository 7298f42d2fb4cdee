//! Snapshot reader.

use tracing::debug;

use jobsync_core::{JobState, Snapshot};

use crate::queue::{JobQueue, QueueError};

/// Fetch every job in a reconcilable state (waiting, delayed, active).
pub async fn read_snapshot<Q>(queue: &Q) -> Result<Snapshot, QueueError>
where
    Q: JobQueue + ?Sized,
{
    let jobs = queue.list_jobs(&JobState::RECONCILABLE).await?;
    let listed = jobs.len();
    let snapshot = Snapshot::from_jobs(jobs);

    debug!(listed, reconcilable = snapshot.len(), "read queue snapshot");
    Ok(snapshot)
}
