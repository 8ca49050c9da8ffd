//! Dispatcher: creates a run and its triggering job.
//!
//! This is the write path of the API layer. It does not participate in
//! claiming or retry logic — it only seeds the (run, job) pair the worker
//! loop later picks up.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::info;

use climrisk_core::{AnalysisRun, JobId, RunId, TenantId};

use crate::analysis::AnalysisPayload;
use crate::db::{StoreError, map_sqlx_error};
use crate::jobs::store::JobStore;
use crate::jobs::types::{Job, RUN_ANALYSIS};
use crate::runs::RunStore;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Create a queued run plus its `RUN_ANALYSIS` job and return both ids.
    async fn create_run(
        &self,
        tenant_id: TenantId,
        parameters: JsonValue,
    ) -> Result<(RunId, JobId), StoreError>;
}

fn run_and_job(tenant_id: TenantId, parameters: JsonValue) -> (AnalysisRun, Job) {
    let run = AnalysisRun::new(tenant_id.clone(), parameters.clone());
    let payload = serde_json::to_value(AnalysisPayload { parameters })
        .unwrap_or_else(|_| JsonValue::Object(Default::default()));
    let job = Job::new(tenant_id, Some(run.run_id.clone()), RUN_ANALYSIS, payload);
    (run, job)
}

/// Dispatcher over the in-memory stores. The two inserts are sequential; the
/// atomicity contract only matters for the Postgres path.
pub struct InMemoryDispatcher {
    runs: Arc<dyn RunStore>,
    jobs: Arc<dyn JobStore>,
}

impl InMemoryDispatcher {
    pub fn new(runs: Arc<dyn RunStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self { runs, jobs }
    }
}

#[async_trait]
impl Dispatcher for InMemoryDispatcher {
    async fn create_run(
        &self,
        tenant_id: TenantId,
        parameters: JsonValue,
    ) -> Result<(RunId, JobId), StoreError> {
        let (run, job) = run_and_job(tenant_id, parameters);
        let run_id = run.run_id.clone();

        self.runs.create(run).await?;
        let job_id = self
            .jobs
            .enqueue(job)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok((run_id, job_id))
    }
}

/// Postgres dispatcher: run + job are inserted in one transaction, so a
/// caller never observes a run without its triggering job.
#[derive(Debug, Clone)]
pub struct PgDispatcher {
    pool: Arc<PgPool>,
}

impl PgDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl Dispatcher for PgDispatcher {
    async fn create_run(
        &self,
        tenant_id: TenantId,
        parameters: JsonValue,
    ) -> Result<(RunId, JobId), StoreError> {
        let (run, job) = run_and_job(tenant_id, parameters);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("dispatch.begin", e))?;

        sqlx::query(
            r#"
            INSERT INTO analysis_runs (run_id, tenant_id, status, parameters, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(run.tenant_id.as_str())
        .bind(run.status.as_str())
        .bind(&run.parameters)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("dispatch.insert_run", e))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, tenant_id, run_id, type, status, payload,
                              attempts, max_attempts, run_after, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.job_id.as_str())
        .bind(job.tenant_id.as_str())
        .bind(job.run_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(&job.job_type)
        .bind(job.status.as_str())
        .bind(&job.payload)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.run_after)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("dispatch.insert_job", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("dispatch.commit", e))?;

        info!(run_id = %run.run_id, job_id = %job.job_id, "dispatched analysis run");
        Ok((run.run_id, job.job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::{DEFAULT_MAX_ATTEMPTS, JobStatus};
    use crate::runs::InMemoryRunStore;
    use climrisk_core::RunStatus;

    #[tokio::test]
    async fn create_run_seeds_queued_run_and_analysis_job() {
        let runs = InMemoryRunStore::arc();
        let jobs = InMemoryJobStore::arc();
        let dispatcher = InMemoryDispatcher::new(runs.clone(), jobs.clone());

        let tenant = TenantId::default();
        let (run_id, job_id) = dispatcher
            .create_run(tenant.clone(), serde_json::json!({"name": "pilot"}))
            .await
            .unwrap();

        let run = runs.get(&tenant, &run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.parameters["name"], "pilot");

        let job = jobs.get(&tenant, &job_id).await.unwrap().unwrap();
        assert_eq!(job.job_type, RUN_ANALYSIS);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.run_id.as_ref(), Some(&run_id));
    }
}
