//! Declared job definitions.
//!
//! A `JobConfig` is the desired state of a single queued job. Its identity
//! lives in the options (`opts.jobId`) and its version in the payload
//! (`data._version`), so both travel to the queue backend untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, ConfigResult};
use crate::id::JobIdentity;
use crate::job::NewJob;

/// JSON object used for payloads and options.
pub type JsonMap = serde_json::Map<String, JsonValue>;

/// Option key holding the job identity.
pub const IDENTITY_KEY: &str = "jobId";

/// Payload key holding the job definition version.
pub const VERSION_KEY: &str = "_version";

/// Desired state of one queued job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name handed to the execution backend.
    #[serde(default)]
    pub name: String,
    /// Job payload; must carry `_version`.
    #[serde(default)]
    pub data: JsonMap,
    /// Backend options (delay, attempts, priority, ...); must carry `jobId`.
    #[serde(default)]
    pub opts: JsonMap,
    /// Apply this entry even if the live job has an equal or newer version.
    #[serde(default, skip_serializing_if = "is_false")]
    pub force: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl JobConfig {
    /// Create a config with the given name, identity and version.
    pub fn new(name: impl Into<String>, identity: impl Into<String>, version: impl Into<String>) -> Self {
        let mut config = Self {
            name: name.into(),
            ..Default::default()
        };
        config
            .data
            .insert(VERSION_KEY.to_string(), JsonValue::String(version.into()));
        config
            .opts
            .insert(IDENTITY_KEY.to_string(), JsonValue::String(identity.into()));
        config
    }

    /// Add a payload field.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a backend option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.opts.insert(key.into(), value.into());
        self
    }

    /// Bypass the version guard for this entry.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Raw `data._version`, if it is a string.
    pub fn raw_version(&self) -> Option<&str> {
        self.data.get(VERSION_KEY).and_then(JsonValue::as_str)
    }

    /// Identity from `opts.jobId`.
    ///
    /// Non-empty strings are taken as-is; non-zero integers are keyed by
    /// their decimal form. Anything else has no identity.
    pub fn identity(&self) -> Option<JobIdentity> {
        match self.opts.get(IDENTITY_KEY)? {
            JsonValue::String(id) => JobIdentity::new(id.as_str()),
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => {
                if n.as_i64() == Some(0) {
                    None
                } else {
                    JobIdentity::new(n.to_string())
                }
            }
            _ => None,
        }
    }

    /// Build the enqueue request for this config.
    pub fn to_new_job(&self, identity: JobIdentity) -> NewJob {
        NewJob {
            identity,
            name: self.name.clone(),
            payload: self.data.clone(),
            options: self.opts.clone(),
        }
    }
}

/// On-disk layout of a definitions document: a bare array or `{ "jobs": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefinitionsDocument {
    List(Vec<JobConfig>),
    Wrapped { jobs: Vec<JobConfig> },
}

/// Decode a JSON definitions document into job configs (not yet validated).
pub fn parse_job_configs(json: &str) -> ConfigResult<Vec<JobConfig>> {
    let document: DefinitionsDocument =
        serde_json::from_str(json).map_err(|e| ConfigError::malformed(e.to_string()))?;

    Ok(match document {
        DefinitionsDocument::List(jobs) => jobs,
        DefinitionsDocument::Wrapped { jobs } => jobs,
    })
}
