use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::identity::{IdentityUser, IdentityUserPatch, NewIdentityUser};
use crate::domain::sync::{
    LogLevel, PerformerMapping, SyncAction, SyncEvent, SyncEventPage, SyncLogEntry,
    DEFAULT_LOG_RETENTION_DAYS, MAX_LOG_RETENTION_DAYS,
};
use crate::external::models::{paths, PartnerPerformer};
use crate::external::{Connector, ConnectorConfig};
use crate::settings::TenantSettingsStore;
use crate::{CoreResult, IdentityDirectory, MappingStore, SyncLogStore, TenantId};

const DEFAULT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    pub log_retention_days: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl ReconcilerConfig {
    /// Reads `CRM_SYNC_INTERVAL_SECS` and `CRM_SYNC_LOG_RETENTION_DAYS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: std::env::var("CRM_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            log_retention_days: retention_days(
                std::env::var("CRM_SYNC_LOG_RETENTION_DAYS").ok().as_deref(),
                defaults.log_retention_days,
            ),
        }
    }
}

/// Out-of-range or unparsable values fall back to `default`.
fn retention_days(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|days| (1..=MAX_LOG_RETENTION_DAYS).contains(days))
        .unwrap_or(default)
}

/// Counters of one finished run. The full decision log is in the stored event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub event_id: Uuid,
    pub success: bool,
    pub fetched: usize,
    pub created: usize,
    pub adopted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Identity writes performed by the run.
    pub fn mutations(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The tenant is not backed by a partner; no event is written.
    Skipped { reason: String },
    Finished(SyncReport),
}

/// Collects the decisions of a run and mirrors each one to the process log.
struct RunLog<'a> {
    tenant: &'a TenantId,
    entries: Vec<SyncLogEntry>,
}

impl<'a> RunLog<'a> {
    fn new(tenant: &'a TenantId) -> Self {
        Self {
            tenant,
            entries: Vec::new(),
        }
    }

    fn record(
        &mut self,
        level: LogLevel,
        partner_id: Option<&str>,
        action: SyncAction,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let tenant = self.tenant;
        match level {
            LogLevel::Info => info!(%tenant, partner_id, ?action, "{message}"),
            LogLevel::Warn => warn!(%tenant, partner_id, ?action, "{message}"),
            LogLevel::Error => error!(%tenant, partner_id, ?action, "{message}"),
        }
        self.entries.push(SyncLogEntry {
            at: Utc::now(),
            level,
            partner_id: partner_id.map(str::to_owned),
            action,
            message,
        });
    }
}

fn relink_note(relink: bool) -> &'static str {
    if relink {
        " in place of the missing mapped one"
    } else {
        ""
    }
}

fn drift(user: &IdentityUser, performer: &PartnerPerformer) -> IdentityUserPatch {
    IdentityUserPatch {
        login: (user.login != performer.login).then(|| performer.login.clone()),
        email: (user.email != performer.email)
            .then(|| performer.email.clone())
            .flatten(),
        display_name: (user.display_name != performer.full_name)
            .then(|| performer.full_name.clone()),
    }
}

/// Converges each ExternalERP tenant's partner directory into the identity
/// store. Runs for one tenant must not overlap.
pub struct Reconciler {
    settings: TenantSettingsStore,
    identity: Arc<dyn IdentityDirectory>,
    mappings: Arc<dyn MappingStore>,
    log: Arc<dyn SyncLogStore>,
    connector: ConnectorConfig,
}

impl Reconciler {
    pub fn new(
        settings: TenantSettingsStore,
        identity: Arc<dyn IdentityDirectory>,
        mappings: Arc<dyn MappingStore>,
        log: Arc<dyn SyncLogStore>,
        connector: ConnectorConfig,
    ) -> Self {
        Self {
            settings,
            identity,
            mappings,
            log,
            connector,
        }
    }

    /// Runs one reconciliation for `tenant` and stores exactly one event
    /// for it, whether or not the run succeeded. Errors are only returned
    /// when the run could not start or its event could not be written.
    pub async fn sync_now(&self, tenant: &TenantId) -> CoreResult<SyncOutcome> {
        let settings = self.settings.load(tenant).await?;
        let Some(external) = settings.external_settings() else {
            return Ok(SyncOutcome::Skipped {
                reason: "tenant uses the native backend".into(),
            });
        };

        let started = Utc::now();
        let mut log = RunLog::new(tenant);
        let mut report = SyncReport {
            event_id: Uuid::new_v4(),
            ..SyncReport::default()
        };

        let fetched = match Connector::new(external, &self.connector) {
            Ok(connector) => connector.list::<PartnerPerformer>(paths::PERFORMERS).await,
            Err(e) => Err(e),
        };
        let run_error = match fetched {
            Ok(performers) => {
                report.fetched = performers.len();
                log.record(
                    LogLevel::Info,
                    None,
                    SyncAction::Fetched,
                    format!("fetched {} partner performers", performers.len()),
                );
                for performer in &performers {
                    self.reconcile_one(tenant, performer, &mut log, &mut report)
                        .await;
                }
                (report.failed > 0)
                    .then(|| format!("{} of {} performers failed", report.failed, report.fetched))
            }
            Err(e) => {
                log.record(
                    LogLevel::Error,
                    None,
                    SyncAction::Failed,
                    format!("could not fetch partner performers: {e}"),
                );
                Some(e.to_string())
            }
        };

        report.success = run_error.is_none();
        self.finish(tenant, started, log, report.event_id, run_error)
            .await?;
        info!(
            %tenant,
            success = report.success,
            created = report.created,
            adopted = report.adopted,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Reconciliation finished"
        );
        Ok(SyncOutcome::Finished(report))
    }

    async fn finish(
        &self,
        tenant: &TenantId,
        started: DateTime<Utc>,
        log: RunLog<'_>,
        id: Uuid,
        run_error: Option<String>,
    ) -> CoreResult<()> {
        let event = SyncEvent {
            id,
            tenant: tenant.clone(),
            at: started,
            success: run_error.is_none(),
            error: run_error,
            log: log.entries,
        };
        self.log.append(&event).await
    }

    /// Never fails the run: errors are recorded and counted.
    async fn reconcile_one(
        &self,
        tenant: &TenantId,
        performer: &PartnerPerformer,
        log: &mut RunLog<'_>,
        report: &mut SyncReport,
    ) {
        let partner_id = performer.guid.to_string();
        if let Err(e) = self
            .try_reconcile(tenant, &partner_id, performer, log, report)
            .await
        {
            report.failed += 1;
            log.record(
                LogLevel::Error,
                Some(&partner_id),
                SyncAction::Failed,
                e.to_string(),
            );
        }
    }

    async fn try_reconcile(
        &self,
        tenant: &TenantId,
        partner_id: &str,
        performer: &PartnerPerformer,
        log: &mut RunLog<'_>,
        report: &mut SyncReport,
    ) -> CoreResult<()> {
        let mut relink = false;
        if let Some(mapping) = self.mappings.get(tenant, partner_id).await? {
            match self.identity.get(tenant, mapping.user_id).await {
                Ok(user) => {
                    return self
                        .converge(tenant, partner_id, &user, performer, log, report)
                        .await;
                }
                // The mapped identity is gone: provision again and repoint.
                Err(e) if e.is_not_found() => {
                    warn!(%tenant, partner_id, user_id = %mapping.user_id, "Mapped identity is missing");
                    relink = true;
                }
                Err(e) => return Err(e),
            }
        }

        let (user, fresh) = match self.identity.find_by_external_ref(tenant, partner_id).await? {
            Some(user) => {
                report.adopted += 1;
                log.record(
                    LogLevel::Warn,
                    Some(partner_id),
                    SyncAction::Adopted,
                    format!("adopting unmapped identity {}{}", user.id, relink_note(relink)),
                );
                (user, false)
            }
            None => {
                let user = self
                    .identity
                    .create(
                        tenant,
                        NewIdentityUser {
                            login: performer.login.clone(),
                            email: performer.email.clone(),
                            display_name: performer.full_name.clone(),
                            external_ref: Some(partner_id.to_owned()),
                        },
                    )
                    .await?;
                report.created += 1;
                log.record(
                    LogLevel::Info,
                    Some(partner_id),
                    SyncAction::Created,
                    format!("created identity {}{}", user.id, relink_note(relink)),
                );
                (user, true)
            }
        };

        let mapping = PerformerMapping {
            partner_id: partner_id.to_owned(),
            user_id: user.id,
            created_at: Utc::now(),
        };
        let linked = if relink {
            self.mappings.upsert(tenant, &mapping).await
        } else {
            self.mappings.insert(tenant, &mapping).await
        };
        if let Err(e) = linked {
            if fresh {
                self.compensate(tenant, partner_id, user.id, log).await;
            }
            return Err(e);
        }

        if fresh {
            Ok(())
        } else {
            self.converge(tenant, partner_id, &user, performer, log, report)
                .await
        }
    }

    async fn converge(
        &self,
        tenant: &TenantId,
        partner_id: &str,
        user: &IdentityUser,
        performer: &PartnerPerformer,
        log: &mut RunLog<'_>,
        report: &mut SyncReport,
    ) -> CoreResult<()> {
        let patch = drift(user, performer);
        if patch.is_empty() {
            report.unchanged += 1;
            return Ok(());
        }
        self.identity.update(tenant, user.id, patch).await?;
        report.updated += 1;
        log.record(
            LogLevel::Info,
            Some(partner_id),
            SyncAction::Updated,
            format!("updated identity {}", user.id),
        );
        Ok(())
    }

    /// Best effort: a failed delete leaves an identity that the next run
    /// adopts through its external ref.
    async fn compensate(&self, tenant: &TenantId, partner_id: &str, user_id: Uuid, log: &mut RunLog<'_>) {
        match self.identity.delete(tenant, user_id).await {
            Ok(()) => log.record(
                LogLevel::Warn,
                Some(partner_id),
                SyncAction::Compensated,
                format!("mapping failed, deleted identity {user_id}"),
            ),
            Err(e) => log.record(
                LogLevel::Error,
                Some(partner_id),
                SyncAction::Failed,
                format!("mapping failed and identity {user_id} could not be deleted: {e}"),
            ),
        }
    }

    /// Syncs every known tenant in turn. A failing tenant is logged and the
    /// walk continues.
    pub async fn sync_all_now(&self) -> CoreResult<Vec<(TenantId, CoreResult<SyncOutcome>)>> {
        let tenants = self.settings.tenants().await?;
        let mut results = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let outcome = self.sync_now(&tenant).await;
            if let Err(e) = &outcome {
                error!(%tenant, error = %e, "Reconciliation could not run");
            }
            results.push((tenant, outcome));
        }
        Ok(results)
    }

    /// Newest first; expired events are never returned.
    pub async fn events(&self, tenant: &TenantId, skip: u64, limit: u64) -> CoreResult<SyncEventPage> {
        self.log.list(tenant, skip, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn performer() -> PartnerPerformer {
        PartnerPerformer {
            guid: Uuid::new_v4(),
            user_guid: None,
            full_name: "Ann Smith".into(),
            login: "ann".into(),
            email: Some("ann@example.com".into()),
            avatar_url: None,
            department_guid: None,
            position: None,
        }
    }

    fn user() -> IdentityUser {
        IdentityUser {
            id: Uuid::new_v4(),
            login: "ann".into(),
            email: Some("ann@example.com".into()),
            display_name: "Ann Smith".into(),
            avatar_url: None,
            external_ref: None,
        }
    }

    #[test]
    fn no_drift_yields_empty_patch() {
        assert!(drift(&user(), &performer()).is_empty());
    }

    #[test]
    fn drift_only_carries_changed_fields() {
        let mut renamed = performer();
        renamed.full_name = "Ann Jones".into();
        let patch = drift(&user(), &renamed);
        assert_eq!(patch.display_name.as_deref(), Some("Ann Jones"));
        assert!(patch.login.is_none());
        assert!(patch.email.is_none());
    }

    #[test]
    fn config_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.log_retention_days, 7);
    }

    #[test]
    fn retention_days_outside_the_window_fall_back() {
        assert_eq!(retention_days(Some("30"), 7), 30);
        assert_eq!(retention_days(Some("0"), 7), 7);
        assert_eq!(retention_days(Some("-3"), 7), 7);
        assert_eq!(retention_days(Some("9223372036854775807"), 7), 7);
        assert_eq!(retention_days(Some("3651"), 7), 7);
        assert_eq!(retention_days(Some("week"), 7), 7);
        assert_eq!(retention_days(None, 7), 7);
    }
}
