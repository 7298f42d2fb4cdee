//! Pass reporting and failure aggregation.

use serde::Serialize;
use thiserror::Error;

use jobsync_core::{ActionKind, JobIdentity};

use crate::queue::QueueError;

/// Summary of one reconciliation pass.
///
/// Mutation counts only include actions that were applied successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Declared configs after validation.
    pub declared: usize,
    /// Reconcilable jobs found in the queue.
    pub live: usize,
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub removed: usize,
    /// Declared configs that needed no change.
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn record_success(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Create => self.created += 1,
            ActionKind::UpdatePayload => self.updated += 1,
            ActionKind::Replace => self.replaced += 1,
            ActionKind::RemoveExtra => self.removed += 1,
        }
    }

    pub fn applied(&self) -> usize {
        self.created + self.updated + self.replaced + self.removed
    }
}

/// One action that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub identity: JobIdentity,
    pub kind: ActionKind,
    pub error: QueueError,
    /// A replace removed the live job but failed to enqueue the new one.
    /// The identity is absent from the queue until the next pass.
    pub job_removed: bool,
}

impl std::fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.identity, self.error)?;
        if self.job_removed {
            write!(f, " (job removed, not recreated)")?;
        }
        Ok(())
    }
}

/// Every failed action of a pass, plus what did succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} job mutation(s) failed{}", .failures.len(), first_failure(.failures))]
pub struct ApplyFailures {
    /// Sorted by identity.
    pub failures: Vec<ApplyFailure>,
    pub report: ReconcileReport,
}

fn first_failure(failures: &[ApplyFailure]) -> String {
    failures
        .first()
        .map(|first| format!(", first: {first}"))
        .unwrap_or_default()
}

impl ApplyFailures {
    /// Identities whose action failed.
    pub fn identities(&self) -> impl Iterator<Item = &JobIdentity> {
        self.failures.iter().map(|f| &f.identity)
    }
}
