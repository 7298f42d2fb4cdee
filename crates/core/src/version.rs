//! Semantic versions of job definitions.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Monotonic version of a job definition.
///
/// Equality and ordering follow semver precedence, so `0.0.10 > 0.0.9`,
/// `1.0.0 > 1.0.0-rc.1`, and build metadata is ignored (`1.0.0+a == 1.0.0+b`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobVersion(semver::Version);

impl JobVersion {
    /// Parse a version string.
    ///
    /// Surrounding whitespace and a single leading `v` are accepted
    /// (`v1.2.3` parses as `1.2.3`), everything else must be strict semver.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);

        semver::Version::parse(stripped)
            .map(Self)
            .map_err(|_| ConfigError::InvalidVersion(raw.to_string()))
    }

    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl PartialEq for JobVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for JobVersion {}

impl PartialOrd for JobVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JobVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_precedence(&other.0)
    }
}

impl Hash for JobVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.major.hash(state);
        self.0.minor.hash(state);
        self.0.patch.hash(state);
        self.0.pre.hash(state);
    }
}

impl FromStr for JobVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobVersion> for String {
    fn from(value: JobVersion) -> Self {
        value.0.to_string()
    }
}

impl core::fmt::Display for JobVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
