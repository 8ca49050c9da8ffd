//! The `RUN_ANALYSIS` handler.
//!
//! Currently produces a demo evidence payload; the real implementation will
//! call the upstream climate dataset API and summarize its response.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use climrisk_core::{EvidenceContent, EvidenceItem};

use crate::jobs::types::Job;
use crate::jobs::worker::{JobContext, JobHandler};

/// Typed payload carried by `RUN_ANALYSIS` jobs. Malformed payloads fail the
/// job at this boundary instead of deep in handler logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub parameters: JsonValue,
}

/// Executes an analysis run and appends its evidence.
pub struct RunAnalysisHandler;

#[async_trait]
impl JobHandler for RunAnalysisHandler {
    async fn execute(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<()> {
        let payload: AnalysisPayload = serde_json::from_value(job.payload.clone())
            .context("malformed RUN_ANALYSIS payload")?;

        debug!(job_id = %job.job_id, parameters = %payload.parameters, "running analysis");

        let content = EvidenceContent::AnalysisSummary {
            dataset_version: "demo_v1".to_string(),
            scenarios: vec!["ssp245".to_string(), "ssp585".to_string()],
            time_slices: vec![
                "baseline".to_string(),
                "2030s".to_string(),
                "2050s".to_string(),
            ],
            percentile: 50,
            note: Some("Demo evidence produced by worker.".to_string()),
        };

        let item = EvidenceItem::new(job.tenant_id.clone(), job.run_id.clone(), content);
        ctx.evidence
            .append(item)
            .await
            .context("failed to append analysis evidence")?;
        Ok(())
    }
}
