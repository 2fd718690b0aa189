use crate::domain::sync::{
    PerformerMapping, SyncEvent, SyncEventPage, SyncLogEntry, DEFAULT_LOG_RETENTION_DAYS,
    retention_window,
};
use crate::{CoreError, CoreResult, MappingStore, SyncLogStore, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(sqlx::FromRow, Debug)]
struct MappingRow {
    partner_id: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<MappingRow> for PerformerMapping {
    fn from(row: MappingRow) -> Self {
        Self {
            partner_id: row.partner_id,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL implementation of the MappingStore port.
#[derive(Debug, Clone)]
pub struct PostgresMappingStore {
    pool: PgPool,
}

impl PostgresMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for PostgresMappingStore {
    async fn get(&self, tenant: &TenantId, partner_id: &str) -> CoreResult<Option<PerformerMapping>> {
        let row: Option<MappingRow> = sqlx::query_as(
            "SELECT partner_id, user_id, created_at FROM performer_mappings
             WHERE tenant = $1 AND partner_id = $2",
        )
        .bind(tenant.as_str())
        .bind(partner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        Ok(row.map(Into::into))
    }

    async fn insert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO performer_mappings (tenant, partner_id, user_id, created_at)
             VALUES ($1, $2, $3, $4) ON CONFLICT (tenant, partner_id) DO NOTHING",
        )
        .bind(tenant.as_str())
        .bind(&mapping.partner_id)
        .bind(mapping.user_id)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::AlreadyExists(format!(
                "mapping for partner performer {}",
                mapping.partner_id
            )));
        }
        Ok(())
    }

    async fn upsert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO performer_mappings (tenant, partner_id, user_id, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant, partner_id)
             DO UPDATE SET user_id = EXCLUDED.user_id, created_at = EXCLUDED.created_at",
        )
        .bind(tenant.as_str())
        .bind(&mapping.partner_id)
        .bind(mapping.user_id)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        debug!(%tenant, partner_id = %mapping.partner_id, user_id = %mapping.user_id, "Relinked performer mapping");
        Ok(())
    }

    async fn list(&self, tenant: &TenantId) -> CoreResult<Vec<PerformerMapping>> {
        let rows: Vec<MappingRow> = sqlx::query_as(
            "SELECT partner_id, user_id, created_at FROM performer_mappings
             WHERE tenant = $1 ORDER BY partner_id",
        )
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow, Debug)]
struct SyncEventRow {
    id: Uuid,
    tenant: String,
    at: DateTime<Utc>,
    success: bool,
    error: Option<String>,
    log: Json<Vec<SyncLogEntry>>,
}

impl TryFrom<SyncEventRow> for SyncEvent {
    type Error = CoreError;

    fn try_from(row: SyncEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant: TenantId::parse(row.tenant)?,
            at: row.at,
            success: row.success,
            error: row.error,
            log: row.log.0,
        })
    }
}

/// PostgreSQL implementation of the SyncLogStore port. Rows older than the
/// retention window are purged whenever the tenant appends.
#[derive(Debug, Clone)]
pub struct PostgresSyncLog {
    pool: PgPool,
    retention: Duration,
}

impl PostgresSyncLog {
    pub fn new(pool: PgPool, retention_days: i64) -> Self {
        Self {
            pool,
            retention: retention_window(retention_days),
        }
    }

    pub fn with_default_retention(pool: PgPool) -> Self {
        Self::new(pool, DEFAULT_LOG_RETENTION_DAYS)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.retention
    }
}

#[async_trait]
impl SyncLogStore for PostgresSyncLog {
    async fn append(&self, event: &SyncEvent) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::infrastructure)?;

        sqlx::query(
            "INSERT INTO sync_events (id, tenant, at, success, error, log)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.tenant.as_str())
        .bind(event.at)
        .bind(event.success)
        .bind(&event.error)
        .bind(Json(&event.log))
        .execute(&mut *tx)
        .await
        .map_err(CoreError::infrastructure)?;

        let purged = sqlx::query("DELETE FROM sync_events WHERE tenant = $1 AND at < $2")
            .bind(event.tenant.as_str())
            .bind(self.cutoff())
            .execute(&mut *tx)
            .await
            .map_err(CoreError::infrastructure)?
            .rows_affected();

        tx.commit().await.map_err(CoreError::infrastructure)?;
        if purged > 0 {
            debug!(tenant = %event.tenant, purged, "Purged expired sync events");
        }
        Ok(())
    }

    async fn list(&self, tenant: &TenantId, skip: u64, limit: u64) -> CoreResult<SyncEventPage> {
        let cutoff = self.cutoff();
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_events WHERE tenant = $1 AND at >= $2")
                .bind(tenant.as_str())
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await
                .map_err(CoreError::infrastructure)?;

        let rows: Vec<SyncEventRow> = sqlx::query_as(
            "SELECT id, tenant, at, success, error, log FROM sync_events
             WHERE tenant = $1 AND at >= $2
             ORDER BY at DESC OFFSET $3 LIMIT $4",
        )
        .bind(tenant.as_str())
        .bind(cutoff)
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;

        let items = rows
            .into_iter()
            .map(SyncEvent::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(SyncEventPage {
            items,
            total: total.max(0) as u64,
        })
    }
}
