//! Database wiring: connection pool, schema bootstrap, shared store error.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Error type shared by the run tracker, evidence sink and asset store.
///
/// The job store has its own richer error type (`jobs::store::JobStoreError`)
/// because callers branch on it; everything else only needs to surface the
/// failure.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid stored row: {0}")]
    Decode(String),
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("{operation}: {err}"))
}

/// Open a connection pool against the given Postgres URL.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Create the tables if they don't exist (starter-friendly bootstrap; a real
/// deployment would run migrations instead).
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_DDL).execute(pool).await?;
    Ok(())
}

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
  tenant_id TEXT NOT NULL DEFAULT 'default',
  external_id TEXT NOT NULL,
  name TEXT,
  lat DOUBLE PRECISION,
  lon DOUBLE PRECISION,
  meta JSONB NOT NULL DEFAULT '{}'::jsonb,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  PRIMARY KEY (tenant_id, external_id)
);

CREATE TABLE IF NOT EXISTS analysis_runs (
  run_id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL DEFAULT 'default',
  status TEXT NOT NULL,
  parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  error TEXT
);

CREATE TABLE IF NOT EXISTS jobs (
  job_id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL DEFAULT 'default',
  run_id TEXT,
  type TEXT NOT NULL,
  status TEXT NOT NULL,
  payload JSONB NOT NULL DEFAULT '{}'::jsonb,
  attempts INT NOT NULL DEFAULT 0,
  max_attempts INT NOT NULL DEFAULT 3,
  run_after TIMESTAMPTZ NOT NULL DEFAULT now(),
  locked_by TEXT,
  locked_at TIMESTAMPTZ,
  last_error TEXT,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim
  ON jobs (status, run_after, created_at);

CREATE TABLE IF NOT EXISTS evidence_items (
  evidence_id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL DEFAULT 'default',
  run_id TEXT,
  type TEXT NOT NULL,
  content JSONB NOT NULL DEFAULT '{}'::jsonb,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_evidence_tenant_run
  ON evidence_items (tenant_id, run_id, created_at DESC);
"#;
