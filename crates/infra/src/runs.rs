//! Run tracker: durable record of analysis runs.
//!
//! Deliberately a dumb ledger — `set_status` overwrites unconditionally and
//! no transition ordering is validated here. Correct ordering
//! (running → done, running → failed) is a contract owned by the worker
//! loop.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use climrisk_core::{AnalysisRun, RunId, RunStatus, TenantId};

use crate::db::{StoreError, map_sqlx_error};

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run record.
    async fn create(&self, run: AnalysisRun) -> Result<(), StoreError>;

    /// Overwrite status, error and updated_at. Missing runs are ignored.
    async fn set_status(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Fetch a run by tenant + id.
    async fn get(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
    ) -> Result<Option<AnalysisRun>, StoreError>;
}

/// In-memory run tracker for tests and the no-database dev mode.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<(TenantId, RunId), AnalysisRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: AnalysisRun) -> Result<(), StoreError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        runs.insert((run.tenant_id.clone(), run.run_id.clone()), run);
        Ok(())
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        if let Some(run) = runs.get_mut(&(tenant_id.clone(), run_id.clone())) {
            run.status = status;
            run.error = error.map(|e| e.to_string());
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
    ) -> Result<Option<AnalysisRun>, StoreError> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(runs.get(&(tenant_id.clone(), run_id.clone())).cloned())
    }
}

/// Postgres-backed run tracker (`analysis_runs` table).
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: Arc<PgPool>,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create(&self, run: AnalysisRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_runs (run_id, tenant_id, status, parameters, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(run.tenant_id.as_str())
        .bind(run.status.as_str())
        .bind(&run.parameters)
        .bind(&run.error)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("runs.create", e))?;
        Ok(())
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE analysis_runs
            SET status = $3, error = $4, updated_at = now()
            WHERE tenant_id = $1 AND run_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(run_id.as_str())
        .bind(status.as_str())
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("runs.set_status", e))?;
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
    ) -> Result<Option<AnalysisRun>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT run_id, tenant_id, status, parameters, error, created_at, updated_at
            FROM analysis_runs
            WHERE tenant_id = $1 AND run_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(run_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("runs.get", e))?;

        row.map(|r| run_from_row(&r)).transpose()
    }
}

fn run_from_row(row: &sqlx::postgres::PgRow) -> Result<AnalysisRun, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());

    let run_id: String = row.try_get("run_id").map_err(decode)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let parameters: serde_json::Value = row.try_get("parameters").map_err(decode)?;
    let error: Option<String> = row.try_get("error").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    Ok(AnalysisRun {
        run_id: RunId::from_str(&run_id).map_err(|e| StoreError::Decode(e.to_string()))?,
        tenant_id: TenantId::new(tenant_id),
        status: status
            .parse::<RunStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        parameters,
        error,
        created_at,
        updated_at,
    })
}
