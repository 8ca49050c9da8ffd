//! Worker loop: claim one job, dispatch to a handler, report the outcome.
//!
//! Handler failures never escape the loop as process crashes — they are
//! captured, recorded on the job and its run, and the loop keeps going. Only
//! a failing claim (store unreachable) pauses the loop, and even that just
//! sleeps and retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use climrisk_core::RunStatus;

use crate::evidence::EvidenceStore;
use crate::runs::RunStore;

use super::store::{JobStore, JobStoreError};
use super::types::Job;

/// Ambient services a handler may use while executing a job.
#[derive(Clone)]
pub struct JobContext {
    pub evidence: Arc<dyn EvidenceStore>,
}

/// Type-specific job execution logic.
///
/// Handlers run at-least-once: a crash after the handler finished but before
/// the job was marked done replays the job, so side effects should be
/// idempotent.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Routes job type tags to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    fn get(&self, job_type: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }
}

/// Worker loop configuration.
///
/// `worker_id` is injected rather than derived from the host name so many
/// simulated workers can run in one test process without colliding.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity recorded as the lock holder on claimed jobs.
    pub worker_id: String,
    /// Sleep between polls when the queue is empty.
    pub idle_interval: Duration,
    /// Sleep after a failed claim (store unreachable).
    pub error_backoff: Duration,
    /// When set, locks older than this are periodically reclaimed.
    pub lock_timeout: Option<Duration>,
    /// How often the reclaim pass runs.
    pub reclaim_interval: Duration,
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            idle_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(2),
            lock_timeout: Some(Duration::from_secs(600)),
            reclaim_interval: Duration::from_secs(60),
        }
    }

    pub fn without_reclaim(mut self) -> Self {
        self.lock_timeout = None;
        self
    }
}

/// One worker slot. Multiple instances (threads or processes) coordinate
/// solely through the job store's atomic claim.
pub struct Worker {
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    ctx: JobContext,
    registry: HandlerRegistry,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        runs: Arc<dyn RunStore>,
        evidence: Arc<dyn EvidenceStore>,
        registry: HandlerRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            runs,
            ctx: JobContext { evidence },
            registry,
            config,
        }
    }

    /// Run forever. Termination is by external process signal; an in-flight
    /// job is left `running` with a stale lock and picked up later by the
    /// reclaim pass.
    pub async fn run(&self) {
        info!(worker_id = %self.config.worker_id, "worker starting");
        let mut last_reclaim = tokio::time::Instant::now();

        loop {
            if let Some(lock_timeout) = self.config.lock_timeout {
                if last_reclaim.elapsed() >= self.config.reclaim_interval {
                    last_reclaim = tokio::time::Instant::now();
                    if let Err(e) = self.jobs.reclaim_stale(lock_timeout).await {
                        warn!(error = %e, "stale-lock reclaim pass failed");
                    }
                }
            }

            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.idle_interval).await,
                Err(e) => {
                    error!(error = %e, "claim failed; backing off");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// One iteration of the loop: claim and, if a job was available, process
    /// it. Returns whether a job was processed; `Err` means the claim itself
    /// failed (the caller should back off).
    pub async fn tick(&self) -> Result<bool, JobStoreError> {
        let Some(job) = self.jobs.claim(&self.config.worker_id).await? else {
            return Ok(false);
        };

        debug!(
            job_id = %job.job_id,
            job_type = %job.job_type,
            run_id = ?job.run_id,
            attempts = job.attempts,
            "claimed job"
        );
        self.process(job).await;
        Ok(true)
    }

    /// The per-job state machine. Store failures while reporting an outcome
    /// are logged and swallowed: there is nothing better to do with them, and
    /// the reclaim pass covers a job left dangling in `running`.
    async fn process(&self, job: Job) {
        if let Some(run_id) = &job.run_id {
            if let Err(e) = self
                .runs
                .set_status(&job.tenant_id, run_id, RunStatus::Running, None)
                .await
            {
                warn!(run_id = %run_id, error = %e, "failed to mark run running");
            }
        }

        let outcome = match self.registry.get(&job.job_type) {
            Some(handler) => handler.execute(&job, &self.ctx).await,
            None => Err(anyhow::anyhow!("no handler for job type '{}'", job.job_type)),
        };

        match outcome {
            Ok(()) => {
                if let Some(run_id) = &job.run_id {
                    if let Err(e) = self
                        .runs
                        .set_status(&job.tenant_id, run_id, RunStatus::Done, None)
                        .await
                    {
                        warn!(run_id = %run_id, error = %e, "failed to mark run done");
                    }
                }
                if let Err(e) = self.jobs.complete(&job.job_id).await {
                    error!(job_id = %job.job_id, error = %e, "failed to mark job done");
                }
                debug!(job_id = %job.job_id, "job completed");
            }
            Err(err) => {
                let err_text = format!("{err:#}");
                warn!(job_id = %job.job_id, error = %err_text, "job handler failed");

                if let Some(run_id) = &job.run_id {
                    if let Err(e) = self
                        .runs
                        .set_status(&job.tenant_id, run_id, RunStatus::Failed, Some(&err_text))
                        .await
                    {
                        warn!(run_id = %run_id, error = %e, "failed to mark run failed");
                    }
                }
                if let Err(e) = self
                    .jobs
                    .fail_and_requeue(&job.job_id, job.attempts, job.max_attempts, &err_text)
                    .await
                {
                    error!(job_id = %job.job_id, error = %e, "failed to requeue job");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::InMemoryEvidenceStore;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::{BackoffSchedule, JobStatus};
    use crate::runs::InMemoryRunStore;

    use climrisk_core::{AnalysisRun, EvidenceContent, EvidenceItem, TenantId};

    struct OkHandler;

    #[async_trait]
    impl JobHandler for OkHandler {
        async fn execute(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<()> {
            let item = EvidenceItem::new(
                job.tenant_id.clone(),
                job.run_id.clone(),
                EvidenceContent::AnalysisSummary {
                    dataset_version: "test".to_string(),
                    scenarios: vec![],
                    time_slices: vec![],
                    percentile: 50,
                    note: None,
                },
            );
            ctx.evidence.append(item).await?;
            Ok(())
        }
    }

    struct FailHandler;

    #[async_trait]
    impl JobHandler for FailHandler {
        async fn execute(&self, _job: &Job, _ctx: &JobContext) -> anyhow::Result<()> {
            anyhow::bail!("synthetic handler failure")
        }
    }

    struct Fixture {
        jobs: Arc<InMemoryJobStore>,
        runs: Arc<InMemoryRunStore>,
        evidence: Arc<InMemoryEvidenceStore>,
        worker: Worker,
    }

    fn fixture(handler: Option<(&str, Arc<dyn JobHandler>)>) -> Fixture {
        let jobs = Arc::new(InMemoryJobStore::with_backoff(BackoffSchedule::immediate()));
        let runs = Arc::new(InMemoryRunStore::new());
        let evidence = Arc::new(InMemoryEvidenceStore::new());

        let mut registry = HandlerRegistry::new();
        if let Some((job_type, h)) = handler {
            registry.register(job_type, h);
        }

        let worker = Worker::new(
            jobs.clone(),
            runs.clone(),
            evidence.clone(),
            registry,
            WorkerConfig::new("test-worker").without_reclaim(),
        );
        Fixture {
            jobs,
            runs,
            evidence,
            worker,
        }
    }

    async fn seed_run_and_job(f: &Fixture, max_attempts: u32) -> (climrisk_core::RunId, climrisk_core::JobId) {
        let tenant = TenantId::default();
        let run = AnalysisRun::new(tenant.clone(), serde_json::json!({}));
        let run_id = run.run_id.clone();
        f.runs.create(run).await.unwrap();

        let job = Job::new(
            tenant,
            Some(run_id.clone()),
            "TEST",
            serde_json::json!({}),
        )
        .with_max_attempts(max_attempts);
        let job_id = f.jobs.enqueue(job).await.unwrap();
        (run_id, job_id)
    }

    #[tokio::test]
    async fn successful_job_marks_run_and_job_done() {
        let f = fixture(Some(("TEST", Arc::new(OkHandler))));
        let tenant = TenantId::default();
        let (run_id, job_id) = seed_run_and_job(&f, 3).await;

        assert!(f.worker.tick().await.unwrap());

        let run = f.runs.get(&tenant, &run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
        assert!(run.error.is_none());

        let job = f.jobs.get(&tenant, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);

        let items = f.evidence.list(&tenant, Some(&run_id)).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn failing_job_exhausts_attempts_then_parks() {
        let f = fixture(Some(("TEST", Arc::new(FailHandler))));
        let tenant = TenantId::default();
        let (run_id, job_id) = seed_run_and_job(&f, 3).await;

        for _ in 0..3 {
            assert!(f.worker.tick().await.unwrap());
        }

        let job = f.jobs.get(&tenant, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job.last_error.as_deref().unwrap().contains("synthetic"));

        let run = f.runs.get(&tenant, &run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.is_some());

        // No 4th claim ever returns this job.
        assert!(!f.worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn unknown_job_type_is_a_handler_failure() {
        let f = fixture(None);
        let tenant = TenantId::default();
        let (run_id, job_id) = seed_run_and_job(&f, 1).await;

        assert!(f.worker.tick().await.unwrap());

        let job = f.jobs.get(&tenant, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.as_deref().unwrap().contains("no handler"));

        let run = f.runs.get(&tenant, &run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn standalone_job_without_run_completes() {
        let f = fixture(Some(("TEST", Arc::new(OkHandler))));
        let tenant = TenantId::default();
        let job = Job::new(tenant.clone(), None, "TEST", serde_json::json!({}));
        let job_id = f.jobs.enqueue(job).await.unwrap();

        assert!(f.worker.tick().await.unwrap());
        let job = f.jobs.get(&tenant, &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_workers_split_one_job_cleanly() {
        let jobs = Arc::new(InMemoryJobStore::with_backoff(BackoffSchedule::immediate()));
        let runs = Arc::new(InMemoryRunStore::new());
        let evidence = Arc::new(InMemoryEvidenceStore::new());

        let make_worker = |id: &str| {
            let mut registry = HandlerRegistry::new();
            registry.register("TEST", Arc::new(OkHandler) as Arc<dyn JobHandler>);
            Arc::new(Worker::new(
                jobs.clone(),
                runs.clone(),
                evidence.clone(),
                registry,
                WorkerConfig::new(id).without_reclaim(),
            ))
        };

        let a = make_worker("worker-a");
        let b = make_worker("worker-b");

        jobs.enqueue(Job::new(
            TenantId::default(),
            None,
            "TEST",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.tick().await.unwrap() }),
            tokio::spawn(async move { b.tick().await.unwrap() }),
        );
        let processed = [ra.unwrap(), rb.unwrap()];

        // The loser sees an empty claim, never an error.
        assert_eq!(processed.iter().filter(|p| **p).count(), 1);
    }
}
