//! Reconciliation passes against a live queue.
//!
//! ## Pass
//!
//! 1. Validate declared configs (fails fast, nothing touched)
//! 2. Read a snapshot of waiting/delayed/active jobs
//! 3. Plan mutations (`jobsync_core::plan`)
//! 4. Apply them with bounded concurrency, tolerating per-action failure
//! 5. Close the queue handle, on every exit path
//!
//! Each call is a full, level-triggered pass; nothing is retained between
//! calls.

pub mod executor;
pub mod report;
pub mod snapshot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use jobsync_core::{plan, validate, ActionKind, ConfigError, JobConfig, MutationAction};

use crate::queue::{JobQueue, QueueError};

pub use executor::{apply_actions, ApplyOutcome};
pub use report::{ApplyFailure, ApplyFailures, ReconcileReport};
pub use snapshot::read_snapshot;

/// Default number of actions applied concurrently.
pub const DEFAULT_CONCURRENCY: usize = 5000;

/// Tuning for a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Remove live jobs whose identity is not declared.
    pub delete_extra_jobs: bool,
    /// Maximum actions in flight; values below 1 are treated as 1.
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            delete_extra_jobs: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ReconcileOptions {
    pub fn with_delete_extra_jobs(mut self, delete: bool) -> Self {
        self.delete_extra_jobs = delete;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Failure of a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Declared configs were rejected; the queue was not mutated.
    #[error("invalid job config: {0}")]
    Config(#[from] ConfigError),

    /// The snapshot could not be read; the queue was not mutated.
    #[error("failed to read queue snapshot: {0}")]
    Snapshot(#[source] QueueError),

    /// Some actions failed after all of them settled. Successful ones stay applied.
    #[error(transparent)]
    Apply(#[from] ApplyFailures),

    /// The queue handle could not be released.
    #[error("failed to close queue: {0}")]
    Close(#[source] QueueError),
}

/// Converge `queue` onto `configs`.
///
/// The handle is closed before returning, whatever the outcome.
#[instrument(
    skip(queue, configs),
    fields(
        declared = configs.len(),
        delete_extra_jobs = options.delete_extra_jobs,
        concurrency = options.concurrency
    )
)]
pub async fn reconcile<Q>(
    queue: Arc<Q>,
    configs: Vec<JobConfig>,
    options: ReconcileOptions,
) -> Result<ReconcileReport, SyncError>
where
    Q: JobQueue + ?Sized + 'static,
{
    let result = run_pass(Arc::clone(&queue), configs, &options).await;
    finish(queue.as_ref(), result).await
}

/// Plan a pass without applying it.
///
/// Validates, reads the snapshot, and returns the actions `reconcile` would
/// apply. The handle is closed before returning.
pub async fn dry_run<Q>(
    queue: Arc<Q>,
    configs: Vec<JobConfig>,
    options: ReconcileOptions,
) -> Result<Vec<MutationAction>, SyncError>
where
    Q: JobQueue + ?Sized + 'static,
{
    let result = async {
        let declared = validate(configs)?;
        let snapshot = read_snapshot(queue.as_ref()).await.map_err(SyncError::Snapshot)?;
        Ok::<_, SyncError>(plan(&declared, &snapshot, options.delete_extra_jobs))
    }
    .await;
    finish(queue.as_ref(), result).await
}

async fn finish<Q, T>(queue: &Q, result: Result<T, SyncError>) -> Result<T, SyncError>
where
    Q: JobQueue + ?Sized,
{
    match (result, queue.close().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(SyncError::Close(close_err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "failed to close queue after failed pass");
            Err(err)
        }
    }
}

async fn run_pass<Q>(
    queue: Arc<Q>,
    configs: Vec<JobConfig>,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, SyncError>
where
    Q: JobQueue + ?Sized + 'static,
{
    let declared = validate(configs)?;
    let snapshot = read_snapshot(queue.as_ref()).await.map_err(SyncError::Snapshot)?;
    let actions = plan(&declared, &snapshot, options.delete_extra_jobs);

    let touched = actions
        .iter()
        .filter(|action| action.kind() != ActionKind::RemoveExtra)
        .count();
    let mut report = ReconcileReport {
        declared: declared.len(),
        live: snapshot.len(),
        unchanged: declared.len() - touched,
        ..Default::default()
    };

    let outcome = apply_actions(queue, actions, options.concurrency).await;
    for (_, kind) in &outcome.succeeded {
        report.record_success(*kind);
    }
    report.failed = outcome.failures.len();

    info!(
        created = report.created,
        updated = report.updated,
        replaced = report.replaced,
        removed = report.removed,
        unchanged = report.unchanged,
        failed = report.failed,
        "reconciliation pass finished"
    );

    if outcome.failures.is_empty() {
        Ok(report)
    } else {
        Err(SyncError::Apply(ApplyFailures {
            failures: outcome.failures,
            report,
        }))
    }
}
