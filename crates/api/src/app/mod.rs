//! HTTP API application wiring (Axum router + store wiring).
//!
//! This folder is structured like:
//! - `services.rs`: store wiring for the two deployment modes
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

fn build_router(services: Arc<services::AppServices>) -> Router {
    routes::router().layer(Extension(services))
}

/// In-memory mode: no database, and an in-process worker drains the queue.
/// Used by local development and the black-box tests.
pub fn build_in_memory_app() -> Router {
    build_router(Arc::new(services::build_in_memory_services()))
}

/// Postgres mode: connect, bootstrap the schema, and serve. The worker runs
/// as a separate process (`climrisk-worker`).
pub async fn build_postgres_app(database_url: &str) -> anyhow::Result<Router> {
    let services = services::build_postgres_services(database_url).await?;
    Ok(build_router(Arc::new(services)))
}
