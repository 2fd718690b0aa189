use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::connector::Connector;
use super::models::{paths, PartnerPerformer};
use crate::domain::catalog::{NewPerformer, Performer, PerformerUpdate};
use crate::repository::NoFilter;
use crate::{
    CoreError, CoreResult, Entity, IdentityDirectory, MappingStore, Repository, TenantId,
};

/// Performers live in the partner's user directory; display fields come
/// from the partner record rather than the identity store. Rows the partner
/// has not linked to an identity are linked through the reconciliation
/// mappings instead.
pub struct ExternalPerformers {
    connector: Connector,
    identity: Arc<dyn IdentityDirectory>,
    mappings: Arc<dyn MappingStore>,
}

impl ExternalPerformers {
    pub fn new(
        connector: Connector,
        identity: Arc<dyn IdentityDirectory>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            connector,
            identity,
            mappings,
        }
    }

    async fn link(&self, tenant: &TenantId, rows: Vec<PartnerPerformer>) -> CoreResult<Vec<Performer>> {
        let mut performers: Vec<Performer> = rows.into_iter().map(Performer::from).collect();
        if performers.iter().all(|p| p.user_id.is_some()) {
            return Ok(performers);
        }
        let links: HashMap<String, Uuid> = self
            .mappings
            .list(tenant)
            .await?
            .into_iter()
            .map(|m| (m.partner_id, m.user_id))
            .collect();
        for performer in performers.iter_mut().filter(|p| p.user_id.is_none()) {
            performer.user_id = links.get(&performer.id.to_string()).copied();
        }
        Ok(performers)
    }

    async fn link_one(&self, tenant: &TenantId, row: PartnerPerformer) -> CoreResult<Performer> {
        let mut performer = Performer::from(row);
        if performer.user_id.is_none() {
            performer.user_id = self
                .mappings
                .get(tenant, &performer.id.to_string())
                .await?
                .map(|m| m.user_id);
        }
        Ok(performer)
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", Performer::KIND))
    }

    async fn fetch_wire(&self, id: Uuid) -> CoreResult<PartnerPerformer> {
        let rows: Vec<PartnerPerformer> = self.connector.list(paths::PERFORMERS).await?;
        rows.into_iter()
            .find(|row| row.guid == id)
            .ok_or_else(|| Self::not_found(id))
    }
}

#[async_trait]
impl Repository<Performer> for ExternalPerformers {
    async fn create(&self, tenant: &TenantId, input: NewPerformer) -> CoreResult<Performer> {
        let draft = input.validate()?;
        let user = match self.identity.get(tenant, draft.user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::invalid_input(
                    "user_id",
                    format!("unknown user {}", draft.user_id),
                ))
            }
            Err(e) => return Err(e),
        };

        let existing: Vec<PartnerPerformer> = self.connector.list(paths::PERFORMERS).await?;
        let existing = self.link(tenant, existing).await?;
        if existing.iter().any(|p| p.user_id == Some(user.id)) {
            return Err(CoreError::AlreadyExists(format!(
                "performer for user {}",
                user.id
            )));
        }

        let wire = PartnerPerformer {
            guid: Uuid::new_v4(),
            user_guid: Some(user.id),
            full_name: user.display_name,
            login: user.login,
            email: user.email,
            avatar_url: user.avatar_url,
            department_guid: draft.department_id,
            position: draft.position,
        };
        let created: PartnerPerformer = self.connector.create(paths::PERFORMERS, &wire).await?;
        debug!(%tenant, id = %wire.guid, user_id = %user.id, "Created partner performer");
        Ok(created.into())
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Performer> {
        let row = self.fetch_wire(id).await?;
        self.link_one(tenant, row).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        _filter: &NoFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Performer>> {
        let rows: Vec<PartnerPerformer> = self.connector.list(paths::PERFORMERS).await?;
        let mut performers = self.link(tenant, rows).await?;
        Performer::sort(&mut performers);
        Ok(performers)
    }

    async fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        input: PerformerUpdate,
    ) -> CoreResult<Performer> {
        let mut wire = self.fetch_wire(id).await?;
        let mut performer = Performer::from(wire.clone());
        performer.apply_update(input)?;
        wire.department_guid = performer.department_id;
        wire.position = performer.position;

        let replaced: Option<PartnerPerformer> = self
            .connector
            .replace(paths::PERFORMERS, &id.to_string(), &wire)
            .await?;
        debug!(%tenant, %id, "Updated partner performer");
        let row = replaced.ok_or_else(|| Self::not_found(id))?;
        self.link_one(tenant, row).await
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.connector.delete(paths::PERFORMERS, &id.to_string()).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Deleted partner performer");
        Ok(())
    }
}
