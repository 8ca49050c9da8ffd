//! Job store contract and the in-memory implementation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use climrisk_core::{JobId, TenantId};

use super::types::{BackoffSchedule, Job, JobStatus, truncate_error};

/// Durable job queue operations.
///
/// Every method is individually atomic; there is no cross-operation
/// transactionality. Claiming is the only operation with a concurrency
/// contract: across any number of concurrent callers, each eligible job is
/// handed to exactly one caller.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new queued job.
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Claim the oldest queued job whose `run_after` has passed, flipping it
    /// to `running` and assigning the lock to `worker_id`.
    ///
    /// `Ok(None)` means the queue is empty or nothing is eligible yet — that
    /// is not an error.
    async fn claim(&self, worker_id: &str) -> Result<Option<Job>, JobStoreError>;

    /// Mark a job done. Unconditional and idempotent: completing a job twice
    /// is a state-level no-op.
    async fn complete(&self, job_id: &JobId) -> Result<(), JobStoreError>;

    /// Record a failed attempt. Increments attempts; requeues with backoff
    /// while attempts remain, otherwise parks the job in `failed`. The error
    /// text is truncated before storage.
    async fn fail_and_requeue(
        &self,
        job_id: &JobId,
        attempts: u32,
        max_attempts: u32,
        error: &str,
    ) -> Result<(), JobStoreError>;

    /// Fetch a job by tenant + id.
    async fn get(&self, tenant_id: &TenantId, job_id: &JobId) -> Result<Option<Job>, JobStoreError>;

    /// Requeue `running` jobs whose lock is older than `older_than`.
    ///
    /// A stale lock means the owning worker died mid-execution. Each
    /// reclaimed job is treated as a failed attempt so a crash-looping job
    /// still terminates once `max_attempts` is exhausted. Returns the number
    /// of jobs reclaimed.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, JobStoreError>;
}

/// Job store operation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid stored row: {0}")]
    Decode(String),
}

/// Shared failure-accounting policy: both store implementations compute the
/// post-failure state the same way.
pub(crate) struct FailureOutcome {
    pub status: JobStatus,
    pub attempts: u32,
    pub delay: Duration,
}

pub(crate) fn failure_outcome(
    schedule: &BackoffSchedule,
    attempts: u32,
    max_attempts: u32,
) -> FailureOutcome {
    let next_attempts = attempts + 1;
    if next_attempts < max_attempts {
        FailureOutcome {
            status: JobStatus::Queued,
            attempts: next_attempts,
            delay: schedule.delay_for_attempt(attempts),
        }
    } else {
        FailureOutcome {
            status: JobStatus::Failed,
            attempts: next_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// In-memory job store for tests and the no-database dev mode.
///
/// Same semantics as the Postgres store; the whole queue sits behind one
/// mutex, which trivially gives claim its exactly-one-winner property.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<Job>>,
    backoff: BackoffSchedule,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_backoff(BackoffSchedule::default())
    }

    pub fn with_backoff(backoff: BackoffSchedule) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            backoff,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Job>>, JobStoreError> {
        self.jobs
            .lock()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.lock()?;
        let id = job.job_id.clone();
        jobs.push(job);
        Ok(id)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.lock()?;
        let now = Utc::now();

        // Oldest-by-creation queued job that is already eligible.
        let candidate = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Queued && j.run_after <= now)
            .min_by_key(|j| j.created_at);

        let Some(job) = candidate else {
            return Ok(None);
        };

        job.status = JobStatus::Running;
        job.locked_by = Some(worker_id.to_string());
        job.locked_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: &JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.lock()?;
        if let Some(job) = jobs.iter_mut().find(|j| &j.job_id == job_id) {
            job.status = JobStatus::Done;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail_and_requeue(
        &self,
        job_id: &JobId,
        attempts: u32,
        max_attempts: u32,
        error: &str,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .iter_mut()
            .find(|j| &j.job_id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;

        let now = Utc::now();
        let outcome = failure_outcome(&self.backoff, attempts, max_attempts);

        job.status = outcome.status;
        job.attempts = outcome.attempts;
        job.last_error = Some(truncate_error(error));
        job.locked_by = None;
        job.locked_at = None;
        job.run_after = now + chrono::Duration::from_std(outcome.delay).unwrap_or_default();
        job.updated_at = now;
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        job_id: &JobId,
    ) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.lock()?;
        Ok(jobs
            .iter()
            .find(|j| &j.job_id == job_id && &j.tenant_id == tenant_id)
            .cloned())
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, JobStoreError> {
        let mut jobs = self.lock()?;
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(older_than).unwrap_or_default();

        let mut reclaimed = 0;
        for job in jobs.iter_mut() {
            let stale = job.status == JobStatus::Running
                && job.locked_at.map(|at| at < cutoff).unwrap_or(false);
            if !stale {
                continue;
            }

            let outcome = failure_outcome(&self.backoff, job.attempts, job.max_attempts);
            job.status = outcome.status;
            job.attempts = outcome.attempts;
            job.last_error = Some("lock expired (worker presumed dead)".to_string());
            job.locked_by = None;
            job.locked_at = None;
            job.run_after = now + chrono::Duration::from_std(outcome.delay).unwrap_or_default();
            job.updated_at = now;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }
}
