//! Repository contract shared by the native and external backends.
//!
//! Every call carries the tenant namespace. `use_cache` is a hint consumed by
//! the cache-aside decorator; raw backends ignore it.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc};
use uuid::Uuid;

use crate::domain::catalog::{Department, Performer, Project, Stage};
use crate::domain::client::Client;
use crate::domain::parse_id;
use crate::domain::settings::BackendKind;
use crate::domain::ticket::Ticket;
use crate::{CoreResult, TenantId};

/// Filter accepted by `get_all`. Its suffix becomes part of the list cache key.
pub trait ListFilter: Debug + Default + Clone + Send + Sync + 'static {
    fn cache_suffix(&self) -> String;
}

/// Filter for collections that are always listed whole.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoFilter;

impl ListFilter for NoFilter {
    fn cache_suffix(&self) -> String {
        "all".to_string()
    }
}

/// A tenant-scoped entity kind served by a [`Repository`].
pub trait Entity: Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static {
    /// Stable name used in cache keys, collections and log fields.
    const KIND: &'static str;
    const CACHE_TTL_SECONDS: u64;

    type Create: Send + Sync + 'static;
    type Update: Send + Sync + 'static;
    type Filter: ListFilter;

    fn id(&self) -> Uuid;

    /// Every `get_all` filter whose result may contain this entity.
    ///
    /// This is the invalidation table: a write to the entity drops the list
    /// cache entry of each filter returned here, for its state both before and
    /// after the write.
    fn list_filters(&self) -> Vec<Self::Filter>;
}

/// Entities with no joins whose create/update rules are identical on every
/// backend.
pub trait Record: Entity {
    fn from_create(id: Uuid, input: Self::Create) -> CoreResult<Self>;
    fn apply_update(&mut self, input: Self::Update) -> CoreResult<()>;
    fn matches(&self, filter: &Self::Filter) -> bool;
    fn sort(items: &mut [Self]);
}

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn create(&self, tenant: &TenantId, input: E::Create) -> CoreResult<E>;
    async fn get(&self, tenant: &TenantId, id: Uuid, use_cache: bool) -> CoreResult<E>;
    async fn get_all(
        &self,
        tenant: &TenantId,
        filter: &E::Filter,
        use_cache: bool,
    ) -> CoreResult<Vec<E>>;
    async fn update(&self, tenant: &TenantId, id: Uuid, input: E::Update) -> CoreResult<E>;
    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()>;

    /// `get` for an identifier received as text. Malformed ids are `NotFound`.
    async fn get_by_str(&self, tenant: &TenantId, raw_id: &str, use_cache: bool) -> CoreResult<E> {
        let id = parse_id(E::KIND, raw_id)?;
        self.get(tenant, id, use_cache).await
    }

    async fn delete_by_str(&self, tenant: &TenantId, raw_id: &str) -> CoreResult<()> {
        let id = parse_id(E::KIND, raw_id)?;
        self.delete(tenant, id).await
    }
}

/// One tenant's full set of repositories, whatever the data source.
#[derive(Clone)]
pub struct Backend {
    pub kind: BackendKind,
    pub clients: Arc<dyn Repository<Client>>,
    pub departments: Arc<dyn Repository<Department>>,
    pub projects: Arc<dyn Repository<Project>>,
    pub performers: Arc<dyn Repository<Performer>>,
    pub stages: Arc<dyn Repository<Stage>>,
    pub tickets: Arc<dyn Repository<Ticket>>,
}

impl Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Turns a `NotFound` into `None`; any other error is kept.
pub(crate) fn tolerate_missing<T>(result: CoreResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Looks up an optional reference, tolerating a dangling one.
pub(crate) async fn fetch_optional<E: Entity>(
    repo: &dyn Repository<E>,
    tenant: &TenantId,
    id: Option<Uuid>,
) -> CoreResult<Option<E>> {
    match id {
        None => Ok(None),
        Some(id) => tolerate_missing(repo.get(tenant, id, false).await),
    }
}
