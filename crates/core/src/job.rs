//! Queue-side job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::{JsonMap, VERSION_KEY};
use crate::id::JobIdentity;
use crate::version::JobVersion;

/// Lifecycle state of a queued job as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
    Paused,
    Unknown,
}

impl JobState {
    /// States a reconciliation pass may inspect and mutate.
    pub const RECONCILABLE: [JobState; 3] = [JobState::Waiting, JobState::Delayed, JobState::Active];

    pub const ALL: [JobState; 7] = [
        JobState::Waiting,
        JobState::Delayed,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Paused,
        JobState::Unknown,
    ];

    /// Finished work is immutable history; only pending or running jobs qualify.
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed | JobState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
            JobState::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unrecognised names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "waiting" => JobState::Waiting,
            "delayed" => JobState::Delayed,
            "active" => JobState::Active,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            "paused" => JobState::Paused,
            _ => JobState::Unknown,
        }
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as observed in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub identity: JobIdentity,
    pub name: String,
    pub payload: JsonMap,
    /// Options recorded by the backend; may hold keys the declaration never set.
    pub options: JsonMap,
    pub state: JobState,
    /// Enqueue time; survives payload updates, reset by replacement.
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    /// Version recorded in the payload.
    ///
    /// `None` when `_version` is absent or not valid semver.
    pub fn version(&self) -> Option<JobVersion> {
        self.payload
            .get(VERSION_KEY)
            .and_then(JsonValue::as_str)
            .and_then(|raw| JobVersion::parse(raw).ok())
    }
}

/// Enqueue request handed to the queue backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub identity: JobIdentity,
    pub name: String,
    pub payload: JsonMap,
    pub options: JsonMap,
}
