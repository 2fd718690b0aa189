use crate::domain::sync::{
    retention_window, PerformerMapping, SyncEvent, SyncEventPage, DEFAULT_LOG_RETENTION_DAYS,
};
use crate::{CoreError, CoreResult, MappingStore, SyncLogStore, TenantId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory implementation of the MappingStore port.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMappingStore {
    // (tenant, partner id) -> mapping
    mappings: Arc<DashMap<(String, String), PerformerMapping>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn get(&self, tenant: &TenantId, partner_id: &str) -> CoreResult<Option<PerformerMapping>> {
        Ok(self
            .mappings
            .get(&(tenant.to_string(), partner_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn insert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()> {
        match self
            .mappings
            .entry((tenant.to_string(), mapping.partner_id.clone()))
        {
            Entry::Occupied(_) => Err(CoreError::AlreadyExists(format!(
                "mapping for partner performer {}",
                mapping.partner_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(mapping.clone());
                Ok(())
            }
        }
    }

    async fn upsert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()> {
        self.mappings.insert(
            (tenant.to_string(), mapping.partner_id.clone()),
            mapping.clone(),
        );
        Ok(())
    }

    async fn list(&self, tenant: &TenantId) -> CoreResult<Vec<PerformerMapping>> {
        let mut mappings: Vec<_> = self
            .mappings
            .iter()
            .filter(|entry| entry.key().0 == tenant.as_str())
            .map(|entry| entry.value().clone())
            .collect();
        mappings.sort_by(|a, b| a.partner_id.cmp(&b.partner_id));
        Ok(mappings)
    }
}

/// In-memory implementation of the SyncLogStore port. Expired events are
/// purged on append.
#[derive(Debug, Clone)]
pub struct InMemorySyncLog {
    events: Arc<DashMap<String, Vec<SyncEvent>>>,
    retention: Duration,
}

impl InMemorySyncLog {
    pub fn new(retention_days: i64) -> Self {
        Self {
            events: Arc::new(DashMap::new()),
            retention: retention_window(retention_days),
        }
    }
}

impl Default for InMemorySyncLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_RETENTION_DAYS)
    }
}

#[async_trait]
impl SyncLogStore for InMemorySyncLog {
    async fn append(&self, event: &SyncEvent) -> CoreResult<()> {
        let now = Utc::now();
        let mut events = self.events.entry(event.tenant.to_string()).or_default();
        events.retain(|existing| !existing.is_expired(now, self.retention));
        events.push(event.clone());
        Ok(())
    }

    async fn list(&self, tenant: &TenantId, skip: u64, limit: u64) -> CoreResult<SyncEventPage> {
        let now = Utc::now();
        let mut live: Vec<SyncEvent> = self
            .events
            .get(tenant.as_str())
            .map(|events| {
                events
                    .iter()
                    .filter(|event| !event.is_expired(now, self.retention))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        live.sort_by(|a, b| b.at.cmp(&a.at));

        let total = live.len() as u64;
        let items = live
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();
        Ok(SyncEventPage { items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn event(age: Duration) -> SyncEvent {
        SyncEvent {
            id: Uuid::new_v4(),
            tenant: tenant(),
            at: Utc::now() - age,
            success: true,
            error: None,
            log: Vec::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_mapping_is_rejected() {
        let store = InMemoryMappingStore::new();
        let mapping = PerformerMapping {
            partner_id: "p-1".into(),
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        store.insert(&tenant(), &mapping).await.unwrap();
        assert!(matches!(
            store.insert(&tenant(), &mapping).await,
            Err(CoreError::AlreadyExists(_))
        ));
        assert_eq!(store.get(&tenant(), "p-1").await.unwrap(), Some(mapping));
        assert!(store
            .get(&TenantId::parse("globex").unwrap(), "p-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upsert_repoints_an_existing_mapping() {
        let store = InMemoryMappingStore::new();
        let first = PerformerMapping {
            partner_id: "p-1".into(),
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        store.upsert(&tenant(), &first).await.unwrap();
        let relinked = PerformerMapping {
            user_id: Uuid::new_v4(),
            ..first.clone()
        };
        store.upsert(&tenant(), &relinked).await.unwrap();

        assert_eq!(store.get(&tenant(), "p-1").await.unwrap(), Some(relinked));
        assert_eq!(store.list(&tenant()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let log = InMemorySyncLog::default();
        let oldest = event(Duration::hours(3));
        let middle = event(Duration::hours(2));
        let newest = event(Duration::hours(1));
        for e in [&middle, &oldest, &newest] {
            log.append(e).await.unwrap();
        }

        let page = log.list(&tenant(), 0, 2).await.unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<_> = page.items.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![newest.id, middle.id]);

        let rest = log.list(&tenant(), 2, 10).await.unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].id, oldest.id);
    }

    #[tokio::test]
    async fn expired_events_are_hidden() {
        let log = InMemorySyncLog::new(7);
        log.append(&event(Duration::days(8))).await.unwrap();
        log.append(&event(Duration::minutes(1))).await.unwrap();

        let page = log.list(&tenant(), 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn oversized_retention_keeps_the_log_usable() {
        let log = InMemorySyncLog::new(i64::MAX);
        log.append(&event(Duration::days(400))).await.unwrap();
        log.append(&event(Duration::minutes(1))).await.unwrap();

        let page = log.list(&tenant(), 0, 10).await.unwrap();
        assert_eq!(page.total, 2);
    }
}
