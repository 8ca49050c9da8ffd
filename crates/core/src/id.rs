//! Opaque string identifiers used across the system.
//!
//! Runs, jobs and evidence items carry human-readable prefixed identifiers
//! (`run_…`, `job_…`, `evi_…`). The suffix is a UUIDv7 rendered in simple
//! form, so freshly minted identifiers sort roughly by creation time while
//! staying collision-free across processes.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a tenant (multi-tenant boundary).
///
/// Tenants are free-form strings; callers that do not care about tenancy use
/// [`TenantId::default`], which maps to the `"default"` tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

macro_rules! impl_prefixed_id {
    ($t:ty, $prefix:literal, $name:literal) => {
        impl $t {
            /// Mint a new identifier (prefix + UUIDv7 suffix).
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(DomainError::invalid_id(concat!($name, ": empty")));
                }
                if !s.starts_with(concat!($prefix, "_")) {
                    return Err(DomainError::invalid_id(format!(
                        concat!($name, ": expected '", $prefix, "_' prefix, got '{}'"),
                        s
                    )));
                }
                Ok(Self(s.to_string()))
            }
        }
    };
}

/// Identifier of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

/// Identifier of a queued/running job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Identifier of an evidence item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(String);

impl_prefixed_id!(RunId, "run", "RunId");
impl_prefixed_id!(JobId, "job", "JobId");
impl_prefixed_id!(EvidenceId, "evi", "EvidenceId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_carry_prefix_and_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert!(a.as_str().starts_with("run_"));
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        assert!("job_0189".parse::<RunId>().is_err());
        assert!("".parse::<JobId>().is_err());
        assert!("run_0189".parse::<RunId>().is_ok());
    }

    #[test]
    fn tenant_defaults_to_default() {
        assert_eq!(TenantId::default().as_str(), "default");
    }
}
