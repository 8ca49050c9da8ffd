//! Evidence items — immutable artifacts produced while executing a run.
//!
//! Evidence is append-only: the core never updates or deletes an item once
//! written. Content is a tagged union keyed by kind so malformed payloads are
//! rejected at the storage boundary instead of deep inside handler logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EvidenceId, RunId, TenantId};

/// Typed evidence content.
///
/// The serde tag doubles as the persisted `kind` column, so readers can route
/// on the kind without touching the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceContent {
    /// Summary of a completed analysis pass over the climate datasets.
    AnalysisSummary {
        dataset_version: String,
        scenarios: Vec<String>,
        time_slices: Vec<String>,
        percentile: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl EvidenceContent {
    pub fn kind(&self) -> &'static str {
        match self {
            EvidenceContent::AnalysisSummary { .. } => "analysis_summary",
        }
    }
}

/// A single evidence record. `run_id` is a lookup key, not ownership: items
/// may exist without a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_id: EvidenceId,
    pub tenant_id: TenantId,
    pub run_id: Option<RunId>,
    pub content: EvidenceContent,
    pub created_at: DateTime<Utc>,
}

impl EvidenceItem {
    pub fn new(tenant_id: TenantId, run_id: Option<RunId>, content: EvidenceContent) -> Self {
        Self {
            evidence_id: EvidenceId::new(),
            tenant_id,
            run_id,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.content.kind()
    }
}
