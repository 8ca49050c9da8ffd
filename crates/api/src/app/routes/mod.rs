use axum::{
    Router,
    routing::{get, post},
};

pub mod assets;
pub mod evidence;
pub mod runs;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/v1", v1_router())
}

fn v1_router() -> Router {
    Router::new()
        .route("/runs", post(runs::create_run))
        .route("/runs/:run_id", get(runs::get_run))
        .route("/evidence", get(evidence::list_evidence))
        .route("/assets/bulk_upsert", post(assets::bulk_upsert))
}
