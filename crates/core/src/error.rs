//! Input error model.

use thiserror::Error;

use crate::id::JobIdentity;

/// Result type used for declared-config handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Rejection of the declared job list.
///
/// Any of these aborts a reconciliation pass before the queue is mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The declared version is not a valid semantic version.
    #[error("{0} is not a valid semver version")]
    InvalidVersion(String),

    /// `opts.jobId` is absent, empty, zero, or neither a string nor an integer (index in the input list).
    #[error("job config #{0} has no identity: every job needs a non-empty opts.jobId")]
    MissingIdentity(usize),

    /// The same identity is declared more than once.
    #[error("every job needs a unique identity, found {0} twice")]
    DuplicateIdentity(JobIdentity),

    /// The job definition document could not be decoded.
    #[error("malformed job definitions: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
