use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use climrisk_core::{RunId, TenantId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn list_evidence(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::EvidenceQuery>,
) -> axum::response::Response {
    let tenant_id = query.tenant_id.map(TenantId::new).unwrap_or_default();

    let run_id = match query.run_id.as_deref() {
        Some(raw) => match RunId::from_str(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_run_id", e.to_string());
            }
        },
        None => None,
    };

    match services.evidence.list(&tenant_id, run_id.as_ref()).await {
        Ok(items) => {
            let items = items.iter().map(dto::evidence_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
