//! Core job types and retry policy.

use core::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use climrisk_core::{DomainError, JobId, RunId, TenantId};

/// Job type tag for analysis runs triggered by the dispatcher.
pub const RUN_ANALYSIS: &str = "RUN_ANALYSIS";

/// Default retry budget for newly enqueued jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for stored error text.
pub const MAX_ERROR_LEN: usize = 2000;

/// Truncate handler error text before persisting it.
pub fn truncate_error(err: &str) -> String {
    if err.chars().count() <= MAX_ERROR_LEN {
        err.to_string()
    } else {
        err.chars().take(MAX_ERROR_LEN).collect()
    }
}

/// Job execution status.
///
/// `Done` and `Failed` are terminal. Invariant: a `Running` job always has a
/// lock holder; a `Queued` job never does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

/// Fixed escalating backoff table, indexed by attempt number and clamped at
/// the last entry. A pure function of the attempt index so retry timing is
/// testable without a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(5),
            Duration::from_secs(20),
            Duration::from_secs(60),
        ])
    }
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Schedule with no delay — retries become immediately eligible. Tests.
    pub fn immediate() -> Self {
        Self::new(vec![Duration::ZERO])
    }

    /// Delay applied when the given attempt (0-indexed) fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.delays.last() {
            None => Duration::ZERO,
            Some(last) => {
                let idx = (attempt as usize).min(self.delays.len() - 1);
                *self.delays.get(idx).unwrap_or(last)
            }
        }
    }
}

/// A background job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    /// Owning run, if any; standalone jobs carry `None`.
    pub run_id: Option<RunId>,
    /// Type tag used to route the job to a handler.
    pub job_type: String,
    pub payload: JsonValue,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest time the job is eligible for claiming.
    pub run_after: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly queued job, eligible immediately.
    pub fn new(
        tenant_id: TenantId,
        run_id: Option<RunId>,
        job_type: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            tenant_id,
            run_id,
            job_type: job_type.into(),
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_after: now,
            locked_by: None,
            locked_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay the first execution.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.run_after = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_fixed_table() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(schedule.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(schedule.delay_for_attempt(2), Duration::from_secs(60));
        // Clamped at the last entry for any higher attempt count.
        assert_eq!(schedule.delay_for_attempt(3), Duration::from_secs(60));
        assert_eq!(schedule.delay_for_attempt(100), Duration::from_secs(60));
    }

    #[test]
    fn schedule_is_monotone_non_decreasing() {
        let schedule = BackoffSchedule::default();
        let mut prev = Duration::ZERO;
        for attempt in 0..10 {
            let d = schedule.delay_for_attempt(attempt);
            assert!(d >= prev, "delay decreased at attempt {attempt}");
            prev = d;
        }
    }

    #[test]
    fn empty_schedule_yields_zero_delay() {
        let schedule = BackoffSchedule::new(vec![]);
        assert_eq!(schedule.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(schedule.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn error_text_is_bounded() {
        let short = "boom";
        assert_eq!(truncate_error(short), "boom");

        let long = "x".repeat(MAX_ERROR_LEN + 500);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_LEN + 10);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn new_job_is_queued_and_unlocked() {
        let job = Job::new(
            TenantId::default(),
            None,
            RUN_ANALYSIS,
            serde_json::json!({}),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.locked_by.is_none());
        assert!(job.locked_at.is_none());
        assert!(job.run_after <= Utc::now());
    }

    #[test]
    fn delayed_job_is_not_yet_eligible() {
        let job = Job::new(TenantId::default(), None, "X", serde_json::json!({}))
            .delayed(Duration::from_secs(3600));
        assert!(job.run_after > Utc::now());
    }
}
