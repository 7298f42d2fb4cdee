//! Reconciliation planner.
//!
//! Classifies every declared job against the live snapshot and returns the
//! mutations needed to converge. Pure and deterministic: the same inputs
//! always yield the same action list, in declaration order followed by
//! extra-job removals in snapshot order.

use crate::action::MutationAction;
use crate::config::JsonMap;
use crate::job::QueuedJob;
use crate::snapshot::Snapshot;
use crate::validate::{DeclaredJob, DeclaredJobs};

/// Whether a declared job should overwrite the live one.
///
/// Strictly newer versions apply; equal versions never do, and build
/// metadata never makes a version newer. A live job with no readable
/// version is treated as older than any declaration.
pub fn should_apply(declared: &DeclaredJob, live: &QueuedJob) -> bool {
    if declared.config.force {
        return true;
    }
    match live.version() {
        Some(live_version) => declared.version > live_version,
        None => true,
    }
}

/// One-directional options comparison.
///
/// True iff every declared option has an identical value on the live job.
/// Options the backend recorded but the declaration omits are ignored.
pub fn options_match(declared: &JsonMap, live: &JsonMap) -> bool {
    declared
        .iter()
        .all(|(key, value)| live.get(key) == Some(value))
}

/// Build the ordered action list for one pass.
pub fn plan(declared: &DeclaredJobs, snapshot: &Snapshot, delete_extra_jobs: bool) -> Vec<MutationAction> {
    let mut actions = Vec::new();

    for entry in declared.iter() {
        let Some(live) = snapshot.get(&entry.identity) else {
            actions.push(MutationAction::Create(entry.config.to_new_job(entry.identity.clone())));
            continue;
        };

        if !should_apply(entry, live) {
            continue;
        }

        if options_match(&entry.config.opts, &live.options) {
            actions.push(MutationAction::UpdatePayload {
                job: live.clone(),
                payload: entry.config.data.clone(),
            });
        } else {
            actions.push(MutationAction::Replace {
                job: live.clone(),
                replacement: entry.config.to_new_job(entry.identity.clone()),
            });
        }
    }

    if delete_extra_jobs {
        actions.extend(
            snapshot
                .iter()
                .filter(|job| !declared.contains(&job.identity))
                .cloned()
                .map(MutationAction::RemoveExtra),
        );
    }

    actions
}
