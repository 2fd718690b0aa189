//! Per-tenant backend settings, encrypted at rest.
//!
//! Each tenant has one document in its own namespace of the `settings`
//! collection. Only the secret store's ciphertext is persisted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::settings::TenantSettings;
use crate::store::collections;
use crate::{CoreError, CoreResult, DocumentStore, SecretStore, TenantId};

#[derive(Debug, Serialize, Deserialize)]
struct SealedSettings {
    ciphertext: String,
}

#[derive(Clone)]
pub struct TenantSettingsStore {
    store: Arc<dyn DocumentStore>,
    secrets: Arc<dyn SecretStore>,
}

impl TenantSettingsStore {
    pub fn new(store: Arc<dyn DocumentStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { store, secrets }
    }

    fn doc_id() -> Uuid {
        Uuid::nil()
    }

    /// Returns the tenant's settings, persisting the `Native` default the
    /// first time a tenant is seen.
    pub async fn load(&self, tenant: &TenantId) -> CoreResult<TenantSettings> {
        let Some(doc) = self
            .store
            .get(tenant, collections::SETTINGS, Self::doc_id())
            .await?
        else {
            let settings = TenantSettings::native();
            self.save(tenant, &settings).await?;
            info!(%tenant, "No settings found, defaulting to Native backend");
            return Ok(settings);
        };

        let sealed: SealedSettings = serde_json::from_value(doc)
            .map_err(|e| CoreError::Deserialization(format!("settings envelope: {e}")))?;
        let plaintext = self.secrets.decrypt(tenant, &sealed.ciphertext).await?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CoreError::Deserialization(format!("tenant settings: {e}")))
    }

    pub async fn save(&self, tenant: &TenantId, settings: &TenantSettings) -> CoreResult<()> {
        settings.validate()?;
        let plaintext =
            serde_json::to_vec(settings).map_err(|e| CoreError::Serialization(e.to_string()))?;
        let ciphertext = self.secrets.encrypt(tenant, &plaintext).await?;
        let doc = serde_json::to_value(SealedSettings { ciphertext })
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.store
            .upsert(tenant, collections::SETTINGS, Self::doc_id(), doc)
            .await?;
        debug!(%tenant, kind = ?settings.backend_kind, "Saved tenant settings");
        Ok(())
    }

    /// Tenants that have a settings record.
    pub async fn tenants(&self) -> CoreResult<Vec<TenantId>> {
        self.store.namespaces(collections::SETTINGS).await
    }
}
