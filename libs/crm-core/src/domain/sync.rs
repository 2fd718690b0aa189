use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::TenantId;

/// Links a partner performer to the identity created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerMapping {
    pub partner_id: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Fetched,
    Created,
    Adopted,
    Updated,
    Unchanged,
    Failed,
    Compensated,
}

/// One decision taken during a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub partner_id: Option<String>,
    pub action: SyncAction,
    pub message: String,
}

/// Summary of one reconciliation run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: Uuid,
    pub tenant: TenantId,
    pub at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub log: Vec<SyncLogEntry>,
}

impl SyncEvent {
    /// Events older than the retention window are hidden and purged.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.at < now - retention
    }
}

pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 7;
pub const MAX_LOG_RETENTION_DAYS: i64 = 3650;

/// Retention window for `days`, clamped to `1..=MAX_LOG_RETENTION_DAYS`.
pub fn retention_window(days: i64) -> Duration {
    Duration::days(days.clamp(1, MAX_LOG_RETENTION_DAYS))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncEventPage {
    pub items: Vec<SyncEvent>,
    pub total: u64,
}
