use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use climrisk_infra::db::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        StoreError::Decode(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "decode_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
