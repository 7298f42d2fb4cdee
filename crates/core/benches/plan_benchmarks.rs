use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use jobsync_core::{plan, validate, JobConfig, JobIdentity, JobState, JsonMap, QueuedJob, Snapshot, IDENTITY_KEY};
use serde_json::json;

fn declared_configs(count: usize, version: &str) -> Vec<JobConfig> {
    (0..count)
        .map(|i| JobConfig::new("jn", format!("i{i}"), version))
        .collect()
}

/// Half of the declared identities already live at an older version.
fn live_snapshot(count: usize) -> Snapshot {
    Snapshot::from_jobs((0..count / 2).map(|i| {
        let id = format!("i{i}");
        let mut options = JsonMap::new();
        options.insert(IDENTITY_KEY.to_string(), json!(id));
        QueuedJob {
            identity: JobIdentity::new(id).unwrap(),
            name: "jn".to_string(),
            payload: json!({"_version": "0.0.4"}).as_object().cloned().unwrap(),
            options,
            state: JobState::Waiting,
            created_at: Utc::now(),
        }
    }))
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    for count in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || declared_configs(count, "0.0.5"),
                |configs| black_box(validate(configs).unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for count in [1_000usize, 10_000] {
        let declared = validate(declared_configs(count, "0.0.5")).unwrap();
        let snapshot = live_snapshot(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(plan(&declared, &snapshot, true)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate, bench_plan);
criterion_main!(benches);
