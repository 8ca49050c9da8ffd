//! Standalone worker process: claims jobs from Postgres and executes them.
//! Scale out by running more instances against the same database.

use std::sync::Arc;

use anyhow::Context;

use climrisk_infra::analysis::RunAnalysisHandler;
use climrisk_infra::db;
use climrisk_infra::evidence::PgEvidenceStore;
use climrisk_infra::jobs::postgres::PgJobStore;
use climrisk_infra::jobs::types::RUN_ANALYSIS;
use climrisk_infra::jobs::worker::{HandlerRegistry, Worker, WorkerConfig};
use climrisk_infra::runs::PgRunStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    climrisk_observability::init();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for the worker")?;

    let worker_id = std::env::var("WORKER_ID")
        .unwrap_or_else(|_| format!("worker_{}", uuid::Uuid::now_v7().simple()));

    let pool = db::connect(&database_url)
        .await
        .context("failed to connect to database")?;
    db::init_schema(&pool)
        .await
        .context("failed to initialize schema")?;

    let mut registry = HandlerRegistry::new();
    registry.register(RUN_ANALYSIS, Arc::new(RunAnalysisHandler));

    let worker = Worker::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgRunStore::new(pool.clone())),
        Arc::new(PgEvidenceStore::new(pool)),
        registry,
        WorkerConfig::new(worker_id),
    );

    worker.run().await;
    Ok(())
}
