//! Infrastructure layer: Postgres-backed stores, the job queue and the
//! worker loop.
//!
//! Coordination between worker processes happens exclusively through the job
//! table; see [`jobs`] for the claim/retry contracts.

pub mod analysis;
pub mod assets;
pub mod db;
pub mod dispatch;
pub mod evidence;
pub mod jobs;
pub mod runs;
