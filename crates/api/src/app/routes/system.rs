use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;

pub async fn health(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    if services.db_ok().await {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded" })),
        )
            .into_response()
    }
}
