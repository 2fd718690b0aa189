use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{decode, encode};
use crate::domain::catalog::{NewPerformer, Performer, PerformerUpdate};
use crate::domain::identity::IdentityUser;
use crate::repository::NoFilter;
use crate::store::{collections, DocFilter};
use crate::{
    CoreError, CoreResult, DocumentStore, Entity, IdentityDirectory, Repository, TenantId,
};

/// Stored performer; the display fields come from the identity directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PerformerDoc {
    pub id: Uuid,
    pub user_id: Uuid,
    pub department_id: Option<Uuid>,
    pub position: Option<String>,
}

impl PerformerDoc {
    pub(crate) fn into_performer(self, user: Option<&IdentityUser>) -> Performer {
        Performer {
            id: self.id,
            user_id: Some(self.user_id),
            department_id: self.department_id,
            position: self.position,
            display_name: user.map(|u| u.display_name.clone()),
            avatar_url: user.and_then(|u| u.avatar_url.clone()),
        }
    }
}

/// Resolves the identity records of many performers in one directory call.
pub(crate) async fn enrich_all(
    identity: &dyn IdentityDirectory,
    tenant: &TenantId,
    docs: Vec<PerformerDoc>,
) -> CoreResult<Vec<Performer>> {
    let mut user_ids: Vec<Uuid> = docs.iter().map(|doc| doc.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let users: HashMap<Uuid, IdentityUser> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        identity.get_many(tenant, &user_ids).await?
    };
    Ok(docs
        .into_iter()
        .map(|doc| {
            let user = users.get(&doc.user_id);
            doc.into_performer(user)
        })
        .collect())
}

pub struct NativePerformers {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityDirectory>,
}

impl NativePerformers {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityDirectory>) -> Self {
        Self { store, identity }
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", Performer::KIND))
    }

    async fn load(&self, tenant: &TenantId, id: Uuid) -> CoreResult<PerformerDoc> {
        let doc = self
            .store
            .get(tenant, collections::PERFORMERS, id)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        decode(collections::PERFORMERS, doc)
    }

    async fn enrich(&self, tenant: &TenantId, doc: PerformerDoc) -> CoreResult<Performer> {
        let mut enriched = enrich_all(self.identity.as_ref(), tenant, vec![doc]).await?;
        enriched
            .pop()
            .ok_or_else(|| CoreError::Internal("performer lost during enrichment".into()))
    }
}

#[async_trait]
impl Repository<Performer> for NativePerformers {
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

        let existing = self
            .store
            .find(
                tenant,
                collections::PERFORMERS,
                &DocFilter::all().eq("user_id", draft.user_id),
            )
            .await?;
        if !existing.is_empty() {
            return Err(CoreError::AlreadyExists(format!(
                "performer for user {}",
                draft.user_id
            )));
        }

        let doc = PerformerDoc {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            department_id: draft.department_id,
            position: draft.position,
        };
        self.store
            .insert(tenant, collections::PERFORMERS, doc.id, encode(&doc)?)
            .await?;
        debug!(%tenant, id = %doc.id, user_id = %doc.user_id, "Created performer");
        Ok(doc.into_performer(Some(&user)))
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Performer> {
        let doc = self.load(tenant, id).await?;
        self.enrich(tenant, doc).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        _filter: &NoFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Performer>> {
        let docs = self
            .store
            .find(tenant, collections::PERFORMERS, &DocFilter::all())
            .await?
            .into_iter()
            .map(|doc| decode::<PerformerDoc>(collections::PERFORMERS, doc))
            .collect::<CoreResult<Vec<_>>>()?;
        let mut performers = enrich_all(self.identity.as_ref(), tenant, docs).await?;
        Performer::sort(&mut performers);
        Ok(performers)
    }

    async fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        input: PerformerUpdate,
    ) -> CoreResult<Performer> {
        let mut doc = self.load(tenant, id).await?;
        let mut performer = doc.clone().into_performer(None);
        performer.apply_update(input)?;
        doc.department_id = performer.department_id;
        doc.position = performer.position;
        if !self
            .store
            .replace(tenant, collections::PERFORMERS, id, encode(&doc)?)
            .await?
        {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Updated performer");
        self.enrich(tenant, doc).await
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.store.delete(tenant, collections::PERFORMERS, id).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Deleted performer");
        Ok(())
    }
}
