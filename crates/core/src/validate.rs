//! Validation of declared job configs.

use std::collections::HashMap;

use crate::config::JobConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::id::JobIdentity;
use crate::version::JobVersion;

/// A declared config that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredJob {
    pub identity: JobIdentity,
    pub version: JobVersion,
    pub config: JobConfig,
}

/// Validated configs keyed by identity, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DeclaredJobs {
    entries: Vec<DeclaredJob>,
    index: HashMap<JobIdentity, usize>,
}

impl DeclaredJobs {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &JobIdentity) -> bool {
        self.index.contains_key(identity)
    }

    pub fn get(&self, identity: &JobIdentity) -> Option<&DeclaredJob> {
        self.index.get(identity).map(|&i| &self.entries[i])
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeclaredJob> {
        self.entries.iter()
    }
}

/// Validate declared configs.
///
/// Each entry is checked in input order: version, then identity presence,
/// then uniqueness. The first failure aborts; no partial result is returned.
pub fn validate(configs: Vec<JobConfig>) -> ConfigResult<DeclaredJobs> {
    let mut declared = DeclaredJobs {
        entries: Vec::with_capacity(configs.len()),
        index: HashMap::with_capacity(configs.len()),
    };

    for (position, config) in configs.into_iter().enumerate() {
        let version = match config.raw_version() {
            Some(raw) => JobVersion::parse(raw)?,
            None => {
                let shown = config
                    .data
                    .get(crate::config::VERSION_KEY)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "undefined".to_string());
                return Err(ConfigError::InvalidVersion(shown));
            }
        };

        let identity = config
            .identity()
            .ok_or(ConfigError::MissingIdentity(position))?;

        if declared.index.contains_key(&identity) {
            return Err(ConfigError::DuplicateIdentity(identity));
        }

        declared.index.insert(identity.clone(), declared.entries.len());
        declared.entries.push(DeclaredJob {
            identity,
            version,
            config,
        });
    }

    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IDENTITY_KEY;
    use serde_json::json;

    #[test]
    fn keeps_declaration_order() {
        let declared = validate(vec![
            JobConfig::new("jn", "b", "0.0.4"),
            JobConfig::new("jn", "a", "0.0.4"),
        ])
        .unwrap();

        let order: Vec<_> = declared.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert!(declared.contains(&JobIdentity::new("a").unwrap()));
    }

    #[test]
    fn rejects_invalid_version() {
        let err = validate(vec![JobConfig::new("jn", "a", "not-semver")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidVersion("not-semver".to_string()));
    }

    #[test]
    fn rejects_missing_version() {
        let mut config = JobConfig::new("jn", "a", "0.0.4");
        config.data.clear();
        let err = validate(vec![config]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidVersion("undefined".to_string()));
    }

    #[test]
    fn rejects_missing_identity() {
        let mut config = JobConfig::new("jn", "a", "0.0.4");
        config.opts.clear();
        let err = validate(vec![JobConfig::new("jn", "ok", "0.0.4"), config]).unwrap_err();
        assert_eq!(err, ConfigError::MissingIdentity(1));
    }

    #[test]
    fn rejects_null_or_zero_identity() {
        let config = JobConfig::new("jn", "a", "0.0.4").with_option(IDENTITY_KEY, json!(null));
        assert_eq!(validate(vec![config]).unwrap_err(), ConfigError::MissingIdentity(0));

        let config = JobConfig::new("jn", "a", "0.0.4").with_option(IDENTITY_KEY, json!(0));
        assert_eq!(validate(vec![config]).unwrap_err(), ConfigError::MissingIdentity(0));
    }

    #[test]
    fn accepts_numeric_identity() {
        let declared = validate(vec![JobConfig::new("jn", "x", "0.0.4").with_option(IDENTITY_KEY, 42)]).unwrap();
        assert!(declared.contains(&JobIdentity::new("42").unwrap()));
    }

    #[test]
    fn numeric_and_string_forms_of_one_identity_collide() {
        let err = validate(vec![
            JobConfig::new("jn", "42", "0.0.4"),
            JobConfig::new("jn", "x", "0.0.4").with_option(IDENTITY_KEY, 42),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateIdentity(JobIdentity::new("42").unwrap()));
    }

    #[test]
    fn rejects_duplicate_identity_by_name() {
        let err = validate(vec![
            JobConfig::new("jn", "id", "0.0.4"),
            JobConfig::new("jn2", "id", "0.0.4"),
        ])
        .unwrap_err();

        assert_eq!(err, ConfigError::DuplicateIdentity(JobIdentity::new("id").unwrap()));
        assert!(err.to_string().contains("id twice"));
    }

    #[test]
    fn version_is_checked_before_identity() {
        let mut config = JobConfig::new("jn", "a", "bogus");
        config.opts.clear();
        assert!(matches!(
            validate(vec![config]),
            Err(ConfigError::InvalidVersion(_))
        ));
    }

    #[test]
    fn first_failure_wins_in_input_order() {
        let err = validate(vec![
            JobConfig::new("jn", "dup", "0.0.4"),
            JobConfig::new("jn", "dup", "0.0.4"),
            JobConfig::new("jn", "x", "bogus"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateIdentity(_)));
    }
}
