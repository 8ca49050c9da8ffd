//! `climrisk-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure
//! concerns): identifiers, run and evidence records, and the domain error
//! model. Queue machinery and storage live in `climrisk-infra`.

pub mod error;
pub mod evidence;
pub mod id;
pub mod run;

pub use error::{DomainError, DomainResult};
pub use evidence::{EvidenceContent, EvidenceItem};
pub use id::{EvidenceId, JobId, RunId, TenantId};
pub use run::{AnalysisRun, RunStatus};
