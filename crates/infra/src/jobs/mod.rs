//! Background job queue with atomic claiming, retry/backoff and a worker
//! loop.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped rows in a shared table; the table is the single
//!   source of truth for ownership.
//! - Claiming is a single atomic select-and-update; concurrent claimers skip
//!   rows locked by others, so each eligible job goes to exactly one worker.
//! - Failures re-enter the queue with a fixed escalating backoff until
//!   `max_attempts` is exhausted, then the job parks in `failed`.
//! - Stale locks left by crashed workers are reclaimed as failed attempts.
//!
//! ## Components
//!
//! - `Job` / `JobStatus` / `BackoffSchedule`: queue records and retry policy
//! - `JobStore`: the claim/complete/fail contract (in-memory and Postgres)
//! - `Worker`: the claim-dispatch-report loop with a handler registry

pub mod postgres;
pub mod store;
pub mod types;
pub mod worker;

pub use postgres::PgJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{BackoffSchedule, Job, JobStatus, RUN_ANALYSIS, truncate_error};
pub use worker::{HandlerRegistry, JobContext, JobHandler, Worker, WorkerConfig};
