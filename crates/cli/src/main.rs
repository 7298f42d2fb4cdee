//! `jobsync`: converge a Redis-backed queue onto a JSON job declaration file.

mod settings;

use std::sync::Arc;

use anyhow::Context;
use jobsync_core::parse_job_configs;
use jobsync_infra::{dry_run, reconcile, RedisJobQueue};
use serde_json::json;

use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    jobsync_observability::tracing::init(settings.log_format);

    let raw = tokio::fs::read_to_string(&settings.jobs_file)
        .await
        .with_context(|| format!("failed to read {}", settings.jobs_file.display()))?;
    let configs = parse_job_configs(&raw)?;

    let queue = RedisJobQueue::connect(&settings.redis_url, &settings.key_prefix, &settings.queue)
        .await
        .with_context(|| format!("failed to connect to {}", settings.redis_url))?;
    let queue = Arc::new(queue);

    let output = if settings.dry_run {
        let actions = dry_run(queue, configs, settings.options).await?;
        let planned: Vec<_> = actions
            .iter()
            .map(|action| json!({ "kind": action.kind(), "identity": action.identity() }))
            .collect();
        json!({ "dry_run": true, "actions": planned })
    } else {
        let report = reconcile(queue, configs, settings.options).await?;
        serde_json::to_value(report)?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
