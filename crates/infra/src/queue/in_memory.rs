//! In-memory job queue for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use jobsync_core::{JobIdentity, JobState, JsonMap, NewJob, QueuedJob};

use super::{JobQueue, QueueError};

/// Per-state job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
    pub unknown: usize,
}

#[derive(Debug)]
struct StoredJob {
    seq: u64,
    job: QueuedJob,
}

#[derive(Debug, Default)]
struct Shared {
    jobs: RwLock<HashMap<JobIdentity, StoredJob>>,
    next_seq: AtomicU64,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
    mutations: AtomicU64,
    failing_adds: RwLock<HashSet<JobIdentity>>,
    failing_list: AtomicBool,
}

/// Process-local queue.
///
/// Every [`handle`](Self::handle) shares the same storage but can be closed
/// independently, which mirrors opening a fresh backend connection per pass.
/// A closed handle rejects every call with [`QueueError::Closed`].
///
/// Jobs whose options carry a positive `delay` start `delayed`, all others
/// start `waiting`. Creation timestamps are strictly increasing.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open another handle onto the same storage.
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Look up a job in any state.
    pub fn get(&self, identity: &str) -> Option<QueuedJob> {
        let jobs = self.shared.jobs.read().ok()?;
        jobs.get(identity).map(|stored| stored.job.clone())
    }

    pub fn len(&self) -> usize {
        self.shared.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        let Ok(jobs) = self.shared.jobs.read() else {
            return counts;
        };
        for stored in jobs.values() {
            match stored.job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Paused => counts.paused += 1,
                JobState::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Number of add/update/remove calls received across all handles.
    pub fn mutations(&self) -> u64 {
        self.shared.mutations.load(Ordering::SeqCst)
    }

    /// Move a job to another state, as a worker would.
    pub fn set_state(&self, identity: &str, state: JobState) -> Result<(), QueueError> {
        let identity = JobIdentity::new(identity).ok_or_else(|| QueueError::backend("empty identity"))?;
        let mut jobs = self.write_jobs()?;
        let stored = jobs
            .get_mut(&identity)
            .ok_or(QueueError::NotFound(identity.clone()))?;
        stored.job.state = state;
        Ok(())
    }

    /// Make every future `add_job` for `identity` fail.
    pub fn fail_adds_for(&self, identity: &str) {
        if let (Some(id), Ok(mut failing)) = (JobIdentity::new(identity), self.shared.failing_adds.write()) {
            failing.insert(id);
        }
    }

    /// Make `list_jobs` fail until reset.
    pub fn fail_listing(&self, fail: bool) {
        self.shared.failing_list.store(fail, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    fn write_jobs(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<JobIdentity, StoredJob>>, QueueError> {
        self.shared
            .jobs
            .write()
            .map_err(|_| QueueError::backend("job table lock poisoned"))
    }

    /// Strictly increasing creation timestamps, even within one millisecond.
    fn next_timestamp(&self) -> Result<DateTime<Utc>, QueueError> {
        let mut last = self
            .shared
            .last_timestamp
            .lock()
            .map_err(|_| QueueError::backend("clock lock poisoned"))?;
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::milliseconds(1);
            }
        }
        *last = Some(now);
        Ok(now)
    }
}

fn initial_state(options: &JsonMap) -> JobState {
    let delayed = match options.get("delay") {
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|d| d > 0.0),
        _ => false,
    };
    if delayed {
        JobState::Delayed
    } else {
        JobState::Waiting
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<QueuedJob>, QueueError> {
        self.ensure_open()?;
        if self.shared.failing_list.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("listing unavailable".to_string()));
        }

        let jobs = self
            .shared
            .jobs
            .read()
            .map_err(|_| QueueError::backend("job table lock poisoned"))?;
        let mut listed: Vec<_> = jobs
            .values()
            .filter(|stored| states.contains(&stored.job.state))
            .collect();
        listed.sort_by_key(|stored| stored.seq);
        Ok(listed.into_iter().map(|stored| stored.job.clone()).collect())
    }

    async fn add_job(&self, job: NewJob) -> Result<QueuedJob, QueueError> {
        self.ensure_open()?;
        self.shared.mutations.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .shared
            .failing_adds
            .read()
            .map(|failing| failing.contains(&job.identity))
            .unwrap_or(false);
        if rejected {
            return Err(QueueError::backend(format!("add rejected for {}", job.identity)));
        }

        let created_at = self.next_timestamp()?;
        let mut jobs = self.write_jobs()?;
        if jobs.contains_key(&job.identity) {
            return Err(QueueError::AlreadyExists(job.identity));
        }

        let queued = QueuedJob {
            state: initial_state(&job.options),
            identity: job.identity,
            name: job.name,
            payload: job.payload,
            options: job.options,
            created_at,
        };
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        jobs.insert(
            queued.identity.clone(),
            StoredJob {
                seq,
                job: queued.clone(),
            },
        );
        Ok(queued)
    }

    async fn update_payload(&self, job: &QueuedJob, payload: JsonMap) -> Result<(), QueueError> {
        self.ensure_open()?;
        self.shared.mutations.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.write_jobs()?;
        let stored = jobs
            .get_mut(&job.identity)
            .ok_or_else(|| QueueError::NotFound(job.identity.clone()))?;
        stored.job.payload = payload;
        Ok(())
    }

    async fn remove_job(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.ensure_open()?;
        self.shared.mutations.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.write_jobs()?;
        jobs.remove(&job.identity)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(job.identity.clone()))
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
