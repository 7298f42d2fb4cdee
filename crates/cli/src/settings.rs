//! Environment-driven settings for the `jobsync` binary.

use std::path::PathBuf;

use jobsync_infra::{ReconcileOptions, DEFAULT_CONCURRENCY};
use jobsync_infra::queue::redis_queue::DEFAULT_KEY_PREFIX;
use jobsync_observability::LogFormat;
use thiserror::Error;
use tracing::warn;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub redis_url: String,
    pub key_prefix: String,
    pub queue: String,
    pub jobs_file: PathBuf,
    pub dry_run: bool,
    pub log_format: LogFormat,
    pub options: ReconcileOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(SettingsError::Missing(name))
        };

        let redis_url = lookup("JOBSYNC_REDIS_URL").unwrap_or_else(|| {
            warn!("JOBSYNC_REDIS_URL not set; using {DEFAULT_REDIS_URL}");
            DEFAULT_REDIS_URL.to_string()
        });
        let key_prefix = lookup("JOBSYNC_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        let delete_extra_jobs = parse_or("JOBSYNC_DELETE_EXTRA", lookup("JOBSYNC_DELETE_EXTRA"), false, parse_bool)?;
        let dry_run = parse_or("JOBSYNC_DRY_RUN", lookup("JOBSYNC_DRY_RUN"), false, parse_bool)?;
        let concurrency = parse_or(
            "JOBSYNC_CONCURRENCY",
            lookup("JOBSYNC_CONCURRENCY"),
            DEFAULT_CONCURRENCY,
            |v| v.trim().parse().ok(),
        )?;
        let log_format = parse_or(
            "JOBSYNC_LOG_FORMAT",
            lookup("JOBSYNC_LOG_FORMAT"),
            LogFormat::Json,
            |v| v.parse().ok(),
        )?;

        Ok(Self {
            redis_url,
            key_prefix,
            queue: required("JOBSYNC_QUEUE")?,
            jobs_file: PathBuf::from(required("JOBSYNC_JOBS_FILE")?),
            dry_run,
            log_format,
            options: ReconcileOptions::default()
                .with_delete_extra_jobs(delete_extra_jobs)
                .with_concurrency(concurrency),
        })
    }
}

fn parse_or<T>(
    name: &'static str,
    raw: Option<String>,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, SettingsError> {
    match raw {
        None => Ok(default),
        Some(value) => parse(&value).ok_or(SettingsError::Invalid { name, value }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let s = settings(&[("JOBSYNC_QUEUE", "mails"), ("JOBSYNC_JOBS_FILE", "jobs.json")]).unwrap();
        assert_eq!(s.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(s.key_prefix, "jobsync");
        assert_eq!(s.queue, "mails");
        assert_eq!(s.jobs_file, PathBuf::from("jobs.json"));
        assert!(!s.dry_run);
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.options, ReconcileOptions::default());
    }

    #[test]
    fn reads_tuning_vars() {
        let s = settings(&[
            ("JOBSYNC_QUEUE", "mails"),
            ("JOBSYNC_JOBS_FILE", "jobs.json"),
            ("JOBSYNC_DELETE_EXTRA", "true"),
            ("JOBSYNC_CONCURRENCY", "64"),
            ("JOBSYNC_DRY_RUN", "1"),
            ("JOBSYNC_LOG_FORMAT", "pretty"),
            ("JOBSYNC_KEY_PREFIX", "bull"),
        ])
        .unwrap();
        assert!(s.options.delete_extra_jobs);
        assert_eq!(s.options.concurrency, 64);
        assert!(s.dry_run);
        assert_eq!(s.log_format, LogFormat::Pretty);
        assert_eq!(s.key_prefix, "bull");
    }

    #[test]
    fn queue_and_jobs_file_are_required() {
        assert_eq!(
            settings(&[("JOBSYNC_JOBS_FILE", "jobs.json")]),
            Err(SettingsError::Missing("JOBSYNC_QUEUE"))
        );
        assert_eq!(
            settings(&[("JOBSYNC_QUEUE", "mails"), ("JOBSYNC_JOBS_FILE", "  ")]),
            Err(SettingsError::Missing("JOBSYNC_JOBS_FILE"))
        );
    }

    #[test]
    fn rejects_garbage_values() {
        let err = settings(&[
            ("JOBSYNC_QUEUE", "mails"),
            ("JOBSYNC_JOBS_FILE", "jobs.json"),
            ("JOBSYNC_CONCURRENCY", "lots"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            SettingsError::Invalid {
                name: "JOBSYNC_CONCURRENCY",
                value: "lots".into()
            }
        );
    }
}
