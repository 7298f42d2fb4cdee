//! Live queue snapshot restricted to reconcilable jobs.

use std::collections::HashMap;

use crate::id::JobIdentity;
use crate::job::QueuedJob;

/// Jobs a reconciliation pass is allowed to touch.
///
/// Construction drops anything outside [`JobState::RECONCILABLE`](crate::JobState::RECONCILABLE),
/// so completed or failed jobs can never reach the planner.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    jobs: Vec<QueuedJob>,
    index: HashMap<JobIdentity, usize>,
}

impl Snapshot {
    pub fn from_jobs(jobs: impl IntoIterator<Item = QueuedJob>) -> Self {
        let mut snapshot = Self::default();
        for job in jobs {
            if !job.state.is_reconcilable() {
                continue;
            }
            if snapshot.index.contains_key(&job.identity) {
                tracing::warn!(identity = %job.identity, "queue reported identity twice; keeping first");
                continue;
            }
            snapshot.index.insert(job.identity.clone(), snapshot.jobs.len());
            snapshot.jobs.push(job);
        }
        snapshot
    }

    pub fn get(&self, identity: &JobIdentity) -> Option<&QueuedJob> {
        self.index.get(identity).map(|&i| &self.jobs[i])
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs in the order the backend listed them.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedJob> {
        self.jobs.iter()
    }
}
