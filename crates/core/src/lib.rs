//! `jobsync-core`: declarative job reconciliation, pure half.
//!
//! This crate validates declared job configs and plans the queue mutations
//! needed to converge a live snapshot onto them. It performs **no I/O**;
//! reading the queue and applying the plan live in `jobsync-infra`.

pub mod action;
pub mod config;
pub mod error;
pub mod id;
pub mod job;
pub mod plan;
pub mod snapshot;
pub mod validate;
pub mod version;

pub use action::{ActionKind, MutationAction};
pub use config::{parse_job_configs, JobConfig, JsonMap, IDENTITY_KEY, VERSION_KEY};
pub use error::{ConfigError, ConfigResult};
pub use id::JobIdentity;
pub use job::{JobState, NewJob, QueuedJob};
pub use plan::{options_match, plan, should_apply};
pub use snapshot::Snapshot;
pub use validate::{validate, DeclaredJob, DeclaredJobs};
pub use version::JobVersion;
