//! Analysis run records.
//!
//! A run is a logical unit of work tracked independently of the job(s) that
//! execute it. Runs are created by the dispatcher together with a triggering
//! job and mutated only by the worker loop afterwards.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::id::{RunId, TenantId};

/// Run lifecycle status.
///
/// Transitions are monotone: `Queued → Running → {Done | Failed}`. The
/// ordering contract is owned by the worker loop; the run tracker itself is
/// a dumb ledger and does not validate transitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }

    /// Terminal runs are never mutated by a worker again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed)
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "done" => Ok(RunStatus::Done),
            "failed" => Ok(RunStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

/// A tenant-scoped analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: RunId,
    pub tenant_id: TenantId,
    pub status: RunStatus,
    pub parameters: JsonValue,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRun {
    /// Create a freshly queued run.
    pub fn new(tenant_id: TenantId, parameters: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new(),
            tenant_id,
            status: RunStatus::Queued,
            parameters,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Done,
            RunStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<RunStatus>().unwrap(), s);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn new_run_is_queued_without_error() {
        let run = AnalysisRun::new(TenantId::default(), serde_json::json!({}));
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.error.is_none());
        assert!(!run.status.is_terminal());
        assert!(RunStatus::Done.is_terminal());
    }
}
