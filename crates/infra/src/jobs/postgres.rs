//! Postgres-backed job store.
//!
//! The claim operation relies on `FOR UPDATE SKIP LOCKED`: candidate rows are
//! locked exclusively while rows already held by a concurrent claimer are
//! skipped, and the select + update commit as one statement. That combination
//! is what guarantees each eligible job is handed to exactly one worker even
//! under arbitrary interleaving — do not replace it with an in-process lock.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use climrisk_core::{JobId, RunId, TenantId};

use super::store::{JobStore, JobStoreError, failure_outcome};
use super::types::{BackoffSchedule, Job, JobStatus, truncate_error};

/// Job store backed by the shared `jobs` table.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: Arc<PgPool>,
    backoff: BackoffSchedule,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_backoff(pool, BackoffSchedule::default())
    }

    pub fn with_backoff(pool: PgPool, backoff: BackoffSchedule) -> Self {
        Self {
            pool: Arc::new(pool),
            backoff,
        }
    }
}

const JOB_COLUMNS: &str = "job_id, tenant_id, run_id, type, status, payload, attempts, \
     max_attempts, run_after, locked_by, locked_at, last_error, created_at, updated_at";

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, tenant_id, run_id, type, status, payload, attempts,
                max_attempts, run_after, locked_by, locked_at, last_error,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
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
        .bind(&job.locked_by)
        .bind(job.locked_at)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_err("enqueue", e))?;

        Ok(job.job_id)
    }

    /// Single-statement claim: lock the oldest eligible row (skipping rows
    /// held by concurrent claimers), flip it to running and return it.
    #[instrument(skip(self), fields(worker_id = %worker_id), err)]
    async fn claim(&self, worker_id: &str) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!(
            r#"
            WITH next_job AS (
                SELECT job_id
                FROM jobs
                WHERE status = 'queued'
                  AND run_after <= now()
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE jobs
            SET status = 'running',
                locked_by = $1,
                locked_at = now(),
                updated_at = now()
            WHERE job_id IN (SELECT job_id FROM next_job)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage_err("claim", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn complete(&self, job_id: &JobId) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE jobs SET status = 'done', updated_at = now() WHERE job_id = $1")
            .bind(job_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| storage_err("complete", e))?;
        Ok(())
    }

    async fn fail_and_requeue(
        &self,
        job_id: &JobId,
        attempts: u32,
        max_attempts: u32,
        error: &str,
    ) -> Result<(), JobStoreError> {
        let outcome = failure_outcome(&self.backoff, attempts, max_attempts);
        let run_after = Utc::now() + chrono::Duration::from_std(outcome.delay).unwrap_or_default();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                attempts = $3,
                last_error = $4,
                locked_by = NULL,
                locked_at = NULL,
                run_after = $5,
                updated_at = now()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .bind(outcome.status.as_str())
        .bind(outcome.attempts as i32)
        .bind(truncate_error(error))
        .bind(run_after)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_err("fail_and_requeue", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.clone()));
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        job_id: &JobId,
    ) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE tenant_id = $1 AND job_id = $2"
        ))
        .bind(tenant_id.as_str())
        .bind(job_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage_err("get", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Lock-timeout reclaim pass. Stale rows are locked with
    /// `FOR UPDATE SKIP LOCKED` (so concurrent reclaimers don't double-count)
    /// and re-enter the normal failure path one by one inside a single
    /// transaction.
    #[instrument(skip(self), err)]
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, JobStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_err("reclaim_stale.begin", e))?;

        let stale = sqlx::query(
            r#"
            SELECT job_id, attempts, max_attempts
            FROM jobs
            WHERE status = 'running' AND locked_at < $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_err("reclaim_stale.select", e))?;

        let mut reclaimed = 0u64;
        for row in stale {
            let job_id: String = row
                .try_get("job_id")
                .map_err(|e| JobStoreError::Decode(e.to_string()))?;
            let attempts: i32 = row
                .try_get("attempts")
                .map_err(|e| JobStoreError::Decode(e.to_string()))?;
            let max_attempts: i32 = row
                .try_get("max_attempts")
                .map_err(|e| JobStoreError::Decode(e.to_string()))?;

            let outcome =
                failure_outcome(&self.backoff, attempts.max(0) as u32, max_attempts.max(0) as u32);
            let run_after =
                Utc::now() + chrono::Duration::from_std(outcome.delay).unwrap_or_default();

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = $2,
                    attempts = $3,
                    last_error = 'lock expired (worker presumed dead)',
                    locked_by = NULL,
                    locked_at = NULL,
                    run_after = $4,
                    updated_at = now()
                WHERE job_id = $1
                "#,
            )
            .bind(&job_id)
            .bind(outcome.status.as_str())
            .bind(outcome.attempts as i32)
            .bind(run_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_err("reclaim_stale.update", e))?;

            reclaimed += 1;
        }

        tx.commit()
            .await
            .map_err(|e| storage_err("reclaim_stale.commit", e))?;

        if reclaimed > 0 {
            tracing::warn!(reclaimed, "requeued jobs with expired locks");
        }
        Ok(reclaimed)
    }
}

fn storage_err(operation: &str, err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{operation}: {err}"))
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| JobStoreError::Decode(e.to_string());

    let job_id: String = row.try_get("job_id").map_err(decode)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode)?;
    let run_id: Option<String> = row.try_get("run_id").map_err(decode)?;
    let job_type: String = row.try_get("type").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(decode)?;
    let attempts: i32 = row.try_get("attempts").map_err(decode)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(decode)?;
    let run_after: DateTime<Utc> = row.try_get("run_after").map_err(decode)?;
    let locked_by: Option<String> = row.try_get("locked_by").map_err(decode)?;
    let locked_at: Option<DateTime<Utc>> = row.try_get("locked_at").map_err(decode)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    Ok(Job {
        job_id: JobId::from_str(&job_id).map_err(|e| JobStoreError::Decode(e.to_string()))?,
        tenant_id: TenantId::new(tenant_id),
        run_id: run_id
            .map(|r| RunId::from_str(&r))
            .transpose()
            .map_err(|e| JobStoreError::Decode(e.to_string()))?,
        job_type,
        payload,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| JobStoreError::Decode(e.to_string()))?,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        run_after,
        locked_by,
        locked_at,
        last_error,
        created_at,
        updated_at,
    })
}
