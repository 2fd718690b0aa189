//! Cache-aside decorator applied to every repository of a [`Backend`].
//!
//! Reads with `use_cache` go through the cache; writes call through first
//! and then drop every key listed by [`keys::invalidation_keys`]. Keys are
//! scoped by backend kind as well as tenant. Cache faults are logged and
//! treated as misses, they never reach the caller.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::settings::BackendKind;
use crate::repository::tolerate_missing;
use crate::{Backend, Cache, CoreResult, Entity, Repository, TenantId};

pub mod keys;

use keys::Scope;

/// Wraps each repository of `backend` with the same cache.
pub fn wrap(backend: Backend, cache: Arc<dyn Cache>) -> Backend {
    let kind = backend.kind;
    Backend {
        kind,
        clients: Arc::new(CachedRepository::new(backend.clients, kind, cache.clone())),
        departments: Arc::new(CachedRepository::new(backend.departments, kind, cache.clone())),
        projects: Arc::new(CachedRepository::new(backend.projects, kind, cache.clone())),
        performers: Arc::new(CachedRepository::new(backend.performers, kind, cache.clone())),
        stages: Arc::new(CachedRepository::new(backend.stages, kind, cache.clone())),
        tickets: Arc::new(CachedRepository::new(backend.tickets, kind, cache)),
    }
}

pub struct CachedRepository<E: Entity> {
    inner: Arc<dyn Repository<E>>,
    backend: BackendKind,
    cache: Arc<dyn Cache>,
}

impl<E: Entity> CachedRepository<E> {
    pub fn new(inner: Arc<dyn Repository<E>>, backend: BackendKind, cache: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            backend,
            cache,
        }
    }

    fn scope<'a>(&self, tenant: &'a TenantId) -> Scope<'a> {
        Scope::new(tenant, self.backend)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(kind = E::KIND, key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(kind = E::KIND, key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(kind = E::KIND, key, error = %e, "Cache read failed, falling through");
                None
            }
        }
    }

    async fn populate<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(kind = E::KIND, key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(key, &bytes, Some(E::CACHE_TTL_SECONDS))
            .await
        {
            warn!(kind = E::KIND, key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, tenant: &TenantId, id: Uuid, states: &[&E]) {
        let keys = keys::invalidation_keys(self.scope(tenant), id, states);
        if let Err(e) = self.cache.delete_many(&keys).await {
            warn!(%tenant, kind = E::KIND, %id, error = %e, "Cache invalidation failed");
        } else {
            debug!(%tenant, kind = E::KIND, %id, keys = keys.len(), "Invalidated cache keys");
        }
    }

    /// State before a write, read past the cache so its list keys are exact.
    async fn prior(&self, tenant: &TenantId, id: Uuid) -> CoreResult<Option<E>> {
        tolerate_missing(self.inner.get(tenant, id, false).await)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for CachedRepository<E> {
    async fn create(&self, tenant: &TenantId, input: E::Create) -> CoreResult<E> {
        let created = self.inner.create(tenant, input).await?;
        self.invalidate(tenant, created.id(), &[&created]).await;
        Ok(created)
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, use_cache: bool) -> CoreResult<E> {
        if !use_cache {
            return self.inner.get(tenant, id, false).await;
        }
        let key = keys::item_key(self.scope(tenant), E::KIND, id);
        if let Some(hit) = self.read::<E>(&key).await {
            return Ok(hit);
        }
        let value = self.inner.get(tenant, id, true).await?;
        self.populate(&key, &value).await;
        Ok(value)
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        filter: &E::Filter,
        use_cache: bool,
    ) -> CoreResult<Vec<E>> {
        if !use_cache {
            return self.inner.get_all(tenant, filter, false).await;
        }
        let key = keys::list_key(self.scope(tenant), E::KIND, filter);
        if let Some(hit) = self.read::<Vec<E>>(&key).await {
            return Ok(hit);
        }
        let values = self.inner.get_all(tenant, filter, true).await?;
        self.populate(&key, values.as_slice()).await;
        Ok(values)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: E::Update) -> CoreResult<E> {
        let before = self.prior(tenant, id).await?;
        let updated = self.inner.update(tenant, id, input).await?;
        match &before {
            Some(before) => self.invalidate(tenant, id, &[before, &updated]).await,
            None => self.invalidate(tenant, id, &[&updated]).await,
        }
        Ok(updated)
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        let before = self.prior(tenant, id).await?;
        self.inner.delete(tenant, id).await?;
        let states: Vec<&E> = before.iter().collect();
        self.invalidate(tenant, id, &states).await;
        Ok(())
    }
}
