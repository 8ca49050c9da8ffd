use serde::Deserialize;
use serde_json::Value as JsonValue;

use climrisk_core::{AnalysisRun, EvidenceItem};
use climrisk_infra::assets::AssetUpsert;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    /// Defaults to `{}`, not `null`, so a top-level `name` always has an
    /// object to fold into.
    #[serde(default = "empty_object")]
    pub parameters: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceQuery {
    pub tenant_id: Option<String>,
    pub run_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpsertRequest {
    pub tenant_id: Option<String>,
    pub assets: Vec<AssetUpsert>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn run_to_json(run: &AnalysisRun) -> JsonValue {
    serde_json::json!({
        "run_id": run.run_id.to_string(),
        "tenant_id": run.tenant_id.as_str(),
        "status": run.status.as_str(),
        "parameters": run.parameters,
        "error": run.error,
        "created_at": run.created_at,
        "updated_at": run.updated_at,
    })
}

pub fn evidence_to_json(item: &EvidenceItem) -> JsonValue {
    serde_json::json!({
        "evidence_id": item.evidence_id.to_string(),
        "run_id": item.run_id.as_ref().map(|r| r.to_string()),
        "type": item.kind(),
        "content": item.content,
        "created_at": item.created_at,
    })
}
