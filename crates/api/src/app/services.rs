//! Store wiring for the two deployment modes.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use climrisk_infra::analysis::RunAnalysisHandler;
use climrisk_infra::assets::{AssetStore, InMemoryAssetStore, PgAssetStore};
use climrisk_infra::db;
use climrisk_infra::dispatch::{Dispatcher, InMemoryDispatcher, PgDispatcher};
use climrisk_infra::evidence::{EvidenceStore, InMemoryEvidenceStore, PgEvidenceStore};
use climrisk_infra::jobs::store::InMemoryJobStore;
use climrisk_infra::jobs::types::RUN_ANALYSIS;
use climrisk_infra::jobs::worker::{HandlerRegistry, Worker, WorkerConfig};
use climrisk_infra::runs::{InMemoryRunStore, PgRunStore, RunStore};

/// Everything the HTTP handlers need, behind trait objects so the routes do
/// not care which deployment mode is active.
pub struct AppServices {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub runs: Arc<dyn RunStore>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub assets: Arc<dyn AssetStore>,
    pool: Option<Arc<PgPool>>,
}

impl AppServices {
    /// Database connectivity probe. Always healthy in in-memory mode.
    pub async fn db_ok(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(&**pool).await.is_ok(),
            None => true,
        }
    }
}

/// In-memory stores plus an in-process worker draining the queue.
///
/// Must be called on a tokio runtime (the worker loop is spawned here).
pub fn build_in_memory_services() -> AppServices {
    let jobs = InMemoryJobStore::arc();
    let runs = InMemoryRunStore::arc();
    let evidence = InMemoryEvidenceStore::arc();
    let assets = InMemoryAssetStore::arc();

    let mut registry = HandlerRegistry::new();
    registry.register(RUN_ANALYSIS, Arc::new(RunAnalysisHandler));

    let worker = Arc::new(Worker::new(
        jobs.clone(),
        runs.clone(),
        evidence.clone(),
        registry,
        WorkerConfig::new("in-process-worker"),
    ));
    worker.spawn();
    info!("in-process worker started");

    AppServices {
        dispatcher: Arc::new(InMemoryDispatcher::new(runs.clone(), jobs)),
        runs,
        evidence,
        assets,
        pool: None,
    }
}

/// Postgres-backed stores. Bootstraps the schema on startup; the worker runs
/// as a separate process against the same database.
pub async fn build_postgres_services(database_url: &str) -> anyhow::Result<AppServices> {
    let pool = db::connect(database_url)
        .await
        .context("failed to connect to database")?;
    db::init_schema(&pool)
        .await
        .context("failed to initialize schema")?;
    info!("database schema ready");

    Ok(AppServices {
        dispatcher: Arc::new(PgDispatcher::new(pool.clone())),
        runs: Arc::new(PgRunStore::new(pool.clone())),
        evidence: Arc::new(PgEvidenceStore::new(pool.clone())),
        assets: Arc::new(PgAssetStore::new(pool.clone())),
        pool: Some(Arc::new(pool)),
    })
}
