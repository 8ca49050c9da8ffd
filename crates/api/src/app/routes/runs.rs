use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};

use climrisk_core::{RunId, TenantId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn create_run(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateRunRequest>,
) -> axum::response::Response {
    let tenant_id = body.tenant_id.map(TenantId::new).unwrap_or_default();

    // A top-level `name` folds into the parameters document.
    let mut parameters = body.parameters;
    if let Some(name) = body.name {
        if let Some(obj) = parameters.as_object_mut() {
            obj.insert("name".to_string(), serde_json::Value::String(name));
        }
    }

    match services.dispatcher.create_run(tenant_id, parameters).await {
        Ok((run_id, _job_id)) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "run_id": run_id.to_string(),
                "status": "queued",
            })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_run(
    Extension(services): Extension<Arc<AppServices>>,
    Path(run_id): Path<String>,
    Query(query): Query<dto::TenantQuery>,
) -> axum::response::Response {
    let tenant_id = query.tenant_id.map(TenantId::new).unwrap_or_default();
    let Ok(run_id) = RunId::from_str(&run_id) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "run not found");
    };

    match services.runs.get(&tenant_id, &run_id).await {
        Ok(Some(run)) => (StatusCode::OK, Json(dto::run_to_json(&run))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "run not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
