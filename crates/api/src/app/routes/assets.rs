use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};

use climrisk_core::TenantId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn bulk_upsert(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BulkUpsertRequest>,
) -> axum::response::Response {
    let tenant_id = body.tenant_id.map(TenantId::new).unwrap_or_default();

    match services.assets.bulk_upsert(&tenant_id, body.assets).await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({ "upserted": count })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
