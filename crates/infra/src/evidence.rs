//! Evidence sink: append-only store of artifacts produced during runs.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use climrisk_core::{EvidenceContent, EvidenceId, EvidenceItem, RunId, TenantId};

use crate::db::{StoreError, map_sqlx_error};

/// Page cap for unfiltered listings; per-run listings are unbounded.
pub const UNFILTERED_PAGE_LIMIT: usize = 50;

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Insert a new evidence record. Never updates or deletes.
    async fn append(&self, item: EvidenceItem) -> Result<(), StoreError>;

    /// List evidence for a tenant, newest-first. Without a run filter the
    /// result is capped at [`UNFILTERED_PAGE_LIMIT`] items.
    async fn list(
        &self,
        tenant_id: &TenantId,
        run_id: Option<&RunId>,
    ) -> Result<Vec<EvidenceItem>, StoreError>;
}

/// In-memory evidence sink for tests and the no-database dev mode.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    items: Mutex<Vec<EvidenceItem>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn append(&self, item: EvidenceItem) -> Result<(), StoreError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        items.push(item);
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: &TenantId,
        run_id: Option<&RunId>,
    ) -> Result<Vec<EvidenceItem>, StoreError> {
        let items = self
            .items
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let mut result: Vec<EvidenceItem> = items
            .iter()
            .filter(|i| {
                &i.tenant_id == tenant_id
                    && run_id.map_or(true, |r| i.run_id.as_ref() == Some(r))
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if run_id.is_none() {
            result.truncate(UNFILTERED_PAGE_LIMIT);
        }
        Ok(result)
    }
}

/// Postgres-backed evidence sink (`evidence_items` table).
#[derive(Debug, Clone)]
pub struct PgEvidenceStore {
    pool: Arc<PgPool>,
}

impl PgEvidenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl EvidenceStore for PgEvidenceStore {
    async fn append(&self, item: EvidenceItem) -> Result<(), StoreError> {
        let content = serde_json::to_value(&item.content)
            .map_err(|e| StoreError::Decode(format!("evidence content: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO evidence_items (evidence_id, tenant_id, run_id, type, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.evidence_id.as_str())
        .bind(item.tenant_id.as_str())
        .bind(item.run_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(item.kind())
        .bind(content)
        .bind(item.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("evidence.append", e))?;
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: &TenantId,
        run_id: Option<&RunId>,
    ) -> Result<Vec<EvidenceItem>, StoreError> {
        let rows = match run_id {
            Some(run_id) => {
                sqlx::query(
                    r#"
                    SELECT evidence_id, tenant_id, run_id, content, created_at
                    FROM evidence_items
                    WHERE tenant_id = $1 AND run_id = $2
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(tenant_id.as_str())
                .bind(run_id.as_str())
                .fetch_all(&*self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT evidence_id, tenant_id, run_id, content, created_at
                    FROM evidence_items
                    WHERE tenant_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(tenant_id.as_str())
                .bind(UNFILTERED_PAGE_LIMIT as i64)
                .fetch_all(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("evidence.list", e))?;

        rows.iter().map(item_from_row).collect()
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<EvidenceItem, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());

    let evidence_id: String = row.try_get("evidence_id").map_err(decode)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode)?;
    let run_id: Option<String> = row.try_get("run_id").map_err(decode)?;
    let content: serde_json::Value = row.try_get("content").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    Ok(EvidenceItem {
        evidence_id: EvidenceId::from_str(&evidence_id)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        tenant_id: TenantId::new(tenant_id),
        run_id: run_id
            .map(|r| RunId::from_str(&r))
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        content: serde_json::from_value::<EvidenceContent>(content)
            .map_err(|e| StoreError::Decode(format!("evidence content: {e}")))?,
        created_at,
    })
}
