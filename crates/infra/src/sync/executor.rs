//! Bounded-concurrency action executor.
//!
//! Every action runs as its own task; a semaphore caps how many are in
//! flight. Actions never share an identity, so they need no coordination
//! beyond the cap. A failing action does not stop its siblings; failures are
//! collected and returned once every task has settled.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use jobsync_core::{ActionKind, JobIdentity, MutationAction};

use super::report::ApplyFailure;
use crate::queue::{JobQueue, QueueError};

/// Result of applying an action list.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub succeeded: Vec<(JobIdentity, ActionKind)>,
    /// Sorted by identity.
    pub failures: Vec<ApplyFailure>,
}

#[derive(Debug)]
struct StepError {
    error: QueueError,
    job_removed: bool,
}

impl StepError {
    fn untouched(error: QueueError) -> Self {
        Self {
            error,
            job_removed: false,
        }
    }
}

/// Apply one action against the queue.
///
/// A replace removes first and enqueues second. If the enqueue fails the
/// identity stays absent; there is no rollback.
async fn apply_one<Q>(queue: &Q, action: MutationAction) -> Result<(), StepError>
where
    Q: JobQueue + ?Sized,
{
    match action {
        MutationAction::Create(new_job) => queue
            .add_job(new_job)
            .await
            .map(drop)
            .map_err(StepError::untouched),
        MutationAction::UpdatePayload { job, payload } => queue
            .update_payload(&job, payload)
            .await
            .map_err(StepError::untouched),
        MutationAction::Replace { job, replacement } => {
            queue.remove_job(&job).await.map_err(StepError::untouched)?;
            queue.add_job(replacement).await.map(drop).map_err(|error| StepError {
                error,
                job_removed: true,
            })
        }
        MutationAction::RemoveExtra(job) => queue.remove_job(&job).await.map_err(StepError::untouched),
    }
}

/// Apply `actions` with at most `concurrency` in flight (minimum 1).
///
/// Always waits for every action to settle before returning.
pub async fn apply_actions<Q>(queue: Arc<Q>, actions: Vec<MutationAction>, concurrency: usize) -> ApplyOutcome
where
    Q: JobQueue + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut outstanding: HashMap<JobIdentity, ActionKind> = HashMap::with_capacity(actions.len());
    let mut outcome = ApplyOutcome::default();

    for action in actions {
        let identity = action.identity().clone();
        let kind = action.kind();

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                outcome.failures.push(ApplyFailure {
                    identity,
                    kind,
                    error: QueueError::backend("concurrency limiter closed"),
                    job_removed: false,
                });
                continue;
            }
        };

        outstanding.insert(identity.clone(), kind);
        let queue = Arc::clone(&queue);
        tasks.spawn(async move {
            let _permit = permit;
            debug!(identity = %identity, kind = %kind, "applying action");
            let result = apply_one(queue.as_ref(), action).await;
            (identity, kind, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((identity, kind, result)) => {
                outstanding.remove(&identity);
                match result {
                    Ok(()) => outcome.succeeded.push((identity, kind)),
                    Err(StepError { error, job_removed }) => {
                        warn!(
                            identity = %identity,
                            kind = %kind,
                            error = %error,
                            job_removed,
                            "action failed"
                        );
                        outcome.failures.push(ApplyFailure {
                            identity,
                            kind,
                            error,
                            job_removed,
                        });
                    }
                }
            }
            Err(join_error) => {
                error!(error = %join_error, "action task aborted");
            }
        }
    }

    // Whatever is still outstanding belongs to a task that panicked.
    for (identity, kind) in outstanding {
        outcome.failures.push(ApplyFailure {
            identity,
            kind,
            error: QueueError::backend("action task aborted"),
            job_removed: false,
        });
    }

    outcome.failures.sort_by(|a, b| a.identity.cmp(&b.identity));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use jobsync_core::{JobConfig, JobState, JsonMap, NewJob, QueuedJob};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn new_job(id: &str) -> NewJob {
        let config = JobConfig::new("jn", id, "0.0.4");
        config.to_new_job(config.identity().unwrap())
    }

    /// Tracks the peak number of concurrent `add_job` calls.
    #[derive(Default)]
    struct GaugedQueue {
        inner: InMemoryJobQueue,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl JobQueue for GaugedQueue {
        async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<QueuedJob>, QueueError> {
            self.inner.list_jobs(states).await
        }

        async fn add_job(&self, job: NewJob) -> Result<QueuedJob, QueueError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            let result = self.inner.add_job(job).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn update_payload(&self, job: &QueuedJob, payload: JsonMap) -> Result<(), QueueError> {
            self.inner.update_payload(job, payload).await
        }

        async fn remove_job(&self, job: &QueuedJob) -> Result<(), QueueError> {
            self.inner.remove_job(job).await
        }

        async fn close(&self) -> Result<(), QueueError> {
            self.inner.close().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn respects_concurrency_limit() {
        let queue = Arc::new(GaugedQueue::default());
        let actions = (0..40)
            .map(|i| MutationAction::Create(new_job(&format!("j{i}"))))
            .collect();

        let outcome = apply_actions(Arc::clone(&queue), actions, 3).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.succeeded.len(), 40);
        assert!(queue.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(queue.inner.len(), 40);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let queue = InMemoryJobQueue::arc();
        let outcome = apply_actions(Arc::clone(&queue), vec![MutationAction::Create(new_job("a"))], 0).await;
        assert_eq!(outcome.succeeded.len(), 1);
    }

    #[tokio::test]
    async fn failure_does_not_stop_siblings() {
        let queue = InMemoryJobQueue::arc();
        queue.fail_adds_for("bad");

        let outcome = apply_actions(
            Arc::clone(&queue),
            vec![
                MutationAction::Create(new_job("a")),
                MutationAction::Create(new_job("bad")),
                MutationAction::Create(new_job("b")),
            ],
            1,
        )
        .await;

        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].identity.as_str(), "bad");
        assert!(!outcome.failures[0].job_removed);
        assert!(queue.get("a").is_some());
        assert!(queue.get("b").is_some());
    }

    #[tokio::test]
    async fn replace_with_failed_add_leaves_job_absent() {
        let queue = InMemoryJobQueue::arc();
        let live = queue.add_job(new_job("a")).await.unwrap();
        queue.fail_adds_for("a");

        let outcome = apply_actions(
            Arc::clone(&queue),
            vec![MutationAction::Replace {
                job: live,
                replacement: new_job("a"),
            }],
            4,
        )
        .await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, ActionKind::Replace);
        assert!(outcome.failures[0].job_removed);
        assert!(queue.get("a").is_none());
    }

    #[tokio::test]
    async fn failed_removal_keeps_replace_target() {
        let queue = InMemoryJobQueue::arc();
        let live = queue.add_job(new_job("a")).await.unwrap();
        queue.remove_job(&live).await.unwrap();

        let outcome = apply_actions(
            Arc::clone(&queue),
            vec![MutationAction::Replace {
                job: live,
                replacement: new_job("a"),
            }],
            4,
        )
        .await;

        assert!(matches!(outcome.failures[0].error, QueueError::NotFound(_)));
        assert!(!outcome.failures[0].job_removed);
        assert!(queue.get("a").is_none());
    }
}
