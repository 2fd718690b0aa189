use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::settings::{BackendKind, TenantSettings};
use crate::external::ConnectorConfig;
use crate::settings::TenantSettingsStore;
use crate::{cache_aside, external, native};
use crate::{
    Backend, Cache, CoreError, CoreResult, DocumentStore, IdentityDirectory, MappingStore, TenantId,
};

/// Resolves a tenant to its cache-wrapped backend. Built once per process
/// and shared by reference.
#[derive(Clone)]
pub struct BackendFactory {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityDirectory>,
    mappings: Arc<dyn MappingStore>,
    cache: Arc<dyn Cache>,
    settings: TenantSettingsStore,
    connector: ConnectorConfig,
}

impl BackendFactory {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityDirectory>,
        mappings: Arc<dyn MappingStore>,
        cache: Arc<dyn Cache>,
        settings: TenantSettingsStore,
        connector: ConnectorConfig,
    ) -> Self {
        Self {
            store,
            identity,
            mappings,
            cache,
            settings,
            connector,
        }
    }

    /// Fails with `VaultSealed` when the settings cannot be decrypted.
    pub async fn build_backend(&self, tenant: &TenantId) -> CoreResult<Backend> {
        let settings = self.settings.load(tenant).await?;
        let backend = match settings.backend_kind {
            BackendKind::Native => native::backend(self.store.clone(), self.identity.clone()),
            BackendKind::ExternalErp => {
                let external = settings.external_settings().ok_or_else(|| {
                    CoreError::Configuration(format!(
                        "tenant {tenant} is ExternalERP without partner settings"
                    ))
                })?;
                external::backend(
                    external,
                    &self.connector,
                    self.identity.clone(),
                    self.mappings.clone(),
                )?
            }
        };
        debug!(%tenant, kind = ?backend.kind, "Built backend");
        Ok(cache_aside::wrap(backend, self.cache.clone()))
    }

    pub async fn configure(&self, tenant: &TenantId, settings: &TenantSettings) -> CoreResult<()> {
        self.settings.save(tenant, settings).await?;
        info!(%tenant, kind = ?settings.backend_kind, "Configured tenant backend");
        Ok(())
    }

    pub async fn settings(&self, tenant: &TenantId) -> CoreResult<TenantSettings> {
        self.settings.load(tenant).await
    }

    pub fn settings_store(&self) -> &TenantSettingsStore {
        &self.settings
    }

    pub fn connector_config(&self) -> &ConnectorConfig {
        &self.connector
    }
}
