//! Asset store: plain CRUD, no interaction with the claim/retry logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use climrisk_core::TenantId;

use crate::db::{StoreError, map_sqlx_error};

/// A physical asset (site, building, facility) owned by a tenant, keyed by
/// the tenant's own external identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub tenant_id: TenantId,
    pub external_id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetUpsert {
    pub external_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default = "default_meta")]
    pub meta: JsonValue,
}

fn default_meta() -> JsonValue {
    JsonValue::Object(Default::default())
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Insert-or-update assets by (tenant, external_id). Returns the number
    /// of assets written.
    async fn bulk_upsert(
        &self,
        tenant_id: &TenantId,
        assets: Vec<AssetUpsert>,
    ) -> Result<usize, StoreError>;

    /// Fetch one asset by tenant + external id.
    async fn get(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
    ) -> Result<Option<Asset>, StoreError>;
}

/// In-memory asset store for tests and the no-database dev mode.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: Mutex<HashMap<(TenantId, String), Asset>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn bulk_upsert(
        &self,
        tenant_id: &TenantId,
        assets: Vec<AssetUpsert>,
    ) -> Result<usize, StoreError> {
        let mut map = self
            .assets
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        let now = Utc::now();
        let count = assets.len();

        for upsert in assets {
            let key = (tenant_id.clone(), upsert.external_id.clone());
            match map.get_mut(&key) {
                Some(existing) => {
                    existing.name = upsert.name;
                    existing.lat = upsert.lat;
                    existing.lon = upsert.lon;
                    existing.meta = upsert.meta;
                    existing.updated_at = now;
                }
                None => {
                    map.insert(
                        key,
                        Asset {
                            tenant_id: tenant_id.clone(),
                            external_id: upsert.external_id,
                            name: upsert.name,
                            lat: upsert.lat,
                            lon: upsert.lon,
                            meta: upsert.meta,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
        Ok(count)
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
    ) -> Result<Option<Asset>, StoreError> {
        let map = self
            .assets
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(map
            .get(&(tenant_id.clone(), external_id.to_string()))
            .cloned())
    }
}

/// Postgres-backed asset store (`assets` table).
#[derive(Debug, Clone)]
pub struct PgAssetStore {
    pool: Arc<PgPool>,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn bulk_upsert(
        &self,
        tenant_id: &TenantId,
        assets: Vec<AssetUpsert>,
    ) -> Result<usize, StoreError> {
        let count = assets.len();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("assets.bulk_upsert.begin", e))?;

        for asset in assets {
            sqlx::query(
                r#"
                INSERT INTO assets (tenant_id, external_id, name, lat, lon, meta)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (tenant_id, external_id)
                DO UPDATE SET
                  name = EXCLUDED.name,
                  lat = EXCLUDED.lat,
                  lon = EXCLUDED.lon,
                  meta = EXCLUDED.meta,
                  updated_at = now()
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(&asset.external_id)
            .bind(&asset.name)
            .bind(asset.lat)
            .bind(asset.lon)
            .bind(&asset.meta)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("assets.bulk_upsert", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("assets.bulk_upsert.commit", e))?;
        Ok(count)
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
    ) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, external_id, name, lat, lon, meta, created_at, updated_at
            FROM assets
            WHERE tenant_id = $1 AND external_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(external_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assets.get", e))?;

        row.map(|r| {
            let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());
            Ok(Asset {
                tenant_id: TenantId::new(r.try_get::<String, _>("tenant_id").map_err(decode)?),
                external_id: r.try_get("external_id").map_err(decode)?,
                name: r.try_get("name").map_err(decode)?,
                lat: r.try_get("lat").map_err(decode)?,
                lon: r.try_get("lon").map_err(decode)?,
                meta: r.try_get("meta").map_err(decode)?,
                created_at: r.try_get("created_at").map_err(decode)?,
                updated_at: r.try_get("updated_at").map_err(decode)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(id: &str, name: &str) -> AssetUpsert {
        AssetUpsert {
            external_id: id.to_string(),
            name: Some(name.to_string()),
            lat: Some(-36.85),
            lon: Some(174.76),
            meta: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_external_id() {
        let store = InMemoryAssetStore::new();
        let tenant = TenantId::default();

        let n = store
            .bulk_upsert(&tenant, vec![upsert("site-1", "Old name")])
            .await
            .unwrap();
        assert_eq!(n, 1);

        store
            .bulk_upsert(&tenant, vec![upsert("site-1", "New name")])
            .await
            .unwrap();

        let asset = store.get(&tenant, "site-1").await.unwrap().unwrap();
        assert_eq!(asset.name.as_deref(), Some("New name"));
    }

    #[tokio::test]
    async fn assets_are_tenant_scoped() {
        let store = InMemoryAssetStore::new();
        let tenant_a = TenantId::new("a");
        let tenant_b = TenantId::new("b");

        store
            .bulk_upsert(&tenant_a, vec![upsert("site-1", "A")])
            .await
            .unwrap();

        assert!(store.get(&tenant_b, "site-1").await.unwrap().is_none());
    }
}
