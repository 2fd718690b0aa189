use async_trait::async_trait;
use std::{collections::HashMap, error::Error as StdError};
use uuid::Uuid;

// Declare modules
pub mod adapters;
pub mod cache_aside;
pub mod domain;
pub mod external;
pub mod factory;
pub mod native;
pub mod repository;
pub mod settings;
pub mod store;
pub mod sync;

pub use domain::tenant::TenantId;
pub use repository::{Backend, Entity, ListFilter, Record, Repository};

use domain::identity::{IdentityUser, IdentityUserPatch, NewIdentityUser};
use domain::sync::{PerformerMapping, SyncEvent, SyncEventPage};
use store::{DocFilter, Pipeline};

// Common error type for the CRM data-access core
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Missing record or malformed identifier; callers cannot tell them apart.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid input for `{field}`: {message}")]
    InvalidInput { field: String, message: String },
    /// Transport-level failure talking to the partner system. Safe to retry.
    #[error("Partner system unavailable: {0}")]
    PartnerUnavailable(String),
    /// The partner answered but broke the contract (non-200, bad JSON).
    #[error("Partner system misbehaved: {0}")]
    PartnerMisbehavior(String),
    #[error("Secret store is sealed or unreachable")]
    VaultSealed,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CoreError::Infrastructure(Box::new(err))
    }

    /// Only transport failures towards the partner are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::PartnerUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// Port for caching data
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), CoreError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}

/// Port for the per-tenant document database backing the native backend.
///
/// Every call is addressed by namespace and collection; documents are JSON
/// objects carrying their own `id`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with `AlreadyExists` when the id is taken.
    async fn insert(
        &self,
        ns: &TenantId,
        collection: &str,
        id: Uuid,
        doc: serde_json::Value,
    ) -> CoreResult<()>;

    async fn get(
        &self,
        ns: &TenantId,
        collection: &str,
        id: Uuid,
    ) -> CoreResult<Option<serde_json::Value>>;

    async fn find(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<Vec<serde_json::Value>>;

    /// Returns false when no document with that id exists.
    async fn replace(
        &self,
        ns: &TenantId,
        collection: &str,
        id: Uuid,
        doc: serde_json::Value,
    ) -> CoreResult<bool>;

    async fn upsert(
        &self,
        ns: &TenantId,
        collection: &str,
        id: Uuid,
        doc: serde_json::Value,
    ) -> CoreResult<()>;

    /// Returns false when no document with that id exists.
    async fn delete(&self, ns: &TenantId, collection: &str, id: Uuid) -> CoreResult<bool>;

    async fn delete_many(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<u64>;

    /// Runs a staged-join pipeline inside the store.
    async fn aggregate(
        &self,
        ns: &TenantId,
        pipeline: &Pipeline,
    ) -> CoreResult<Vec<serde_json::Value>>;

    /// Namespaces holding at least one document in `collection`.
    async fn namespaces(&self, collection: &str) -> CoreResult<Vec<TenantId>>;
}

// Port for the secret-management service (encrypt before store, decrypt after fetch)
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn encrypt(&self, tenant: &TenantId, plaintext: &[u8]) -> CoreResult<String>;
    async fn decrypt(&self, tenant: &TenantId, ciphertext: &str) -> CoreResult<Vec<u8>>;
}

// Port for the platform's identity/user directory
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get(&self, tenant: &TenantId, id: Uuid) -> CoreResult<IdentityUser>;
    /// Unknown ids are skipped rather than reported.
    async fn get_many(
        &self,
        tenant: &TenantId,
        ids: &[Uuid],
    ) -> CoreResult<HashMap<Uuid, IdentityUser>>;
    async fn find_by_external_ref(
        &self,
        tenant: &TenantId,
        external_ref: &str,
    ) -> CoreResult<Option<IdentityUser>>;
    async fn create(&self, tenant: &TenantId, user: NewIdentityUser) -> CoreResult<IdentityUser>;
    async fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        patch: IdentityUserPatch,
    ) -> CoreResult<IdentityUser>;
    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()>;
}

// Port for the local partner-performer -> identity mapping table
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, tenant: &TenantId, partner_id: &str)
        -> CoreResult<Option<PerformerMapping>>;
    /// Fails with `AlreadyExists` when the partner id is already mapped.
    async fn insert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()>;
    /// Points the partner id at `mapping.user_id`, whether mapped or not.
    async fn upsert(&self, tenant: &TenantId, mapping: &PerformerMapping) -> CoreResult<()>;
    async fn list(&self, tenant: &TenantId) -> CoreResult<Vec<PerformerMapping>>;
}

// Port for the append-only reconciliation log
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    async fn append(&self, event: &SyncEvent) -> CoreResult<()>;
    /// Newest first, expired events excluded.
    async fn list(&self, tenant: &TenantId, skip: u64, limit: u64) -> CoreResult<SyncEventPage>;
}
