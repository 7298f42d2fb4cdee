//! Mutation actions produced by the planner.

use serde::Serialize;

use crate::config::JsonMap;
use crate::id::JobIdentity;
use crate::job::{NewJob, QueuedJob};

/// A single queue mutation. Pure data until an executor applies it.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationAction {
    /// Enqueue a job that does not exist yet.
    Create(NewJob),
    /// Overwrite the payload of a live job in place.
    UpdatePayload { job: QueuedJob, payload: JsonMap },
    /// Remove the live job, then enqueue the replacement.
    Replace { job: QueuedJob, replacement: NewJob },
    /// Remove a live job that is no longer declared.
    RemoveExtra(QueuedJob),
}

/// Discriminant of [`MutationAction`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    UpdatePayload,
    Replace,
    RemoveExtra,
}

impl MutationAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            MutationAction::Create(_) => ActionKind::Create,
            MutationAction::UpdatePayload { .. } => ActionKind::UpdatePayload,
            MutationAction::Replace { .. } => ActionKind::Replace,
            MutationAction::RemoveExtra(_) => ActionKind::RemoveExtra,
        }
    }

    /// Identity of the job this action targets.
    pub fn identity(&self) -> &JobIdentity {
        match self {
            MutationAction::Create(new_job) => &new_job.identity,
            MutationAction::UpdatePayload { job, .. } => &job.identity,
            MutationAction::Replace { job, .. } => &job.identity,
            MutationAction::RemoveExtra(job) => &job.identity,
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ActionKind::Create => "create",
            ActionKind::UpdatePayload => "update_payload",
            ActionKind::Replace => "replace",
            ActionKind::RemoveExtra => "remove_extra",
        })
    }
}
