use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;

use super::connector::Connector;
use super::models::{paths, PartnerDepartment, PartnerProject, PartnerStage};
use crate::domain::catalog::{Department, Project, Stage};
use crate::{CoreError, CoreResult, Record, Repository, TenantId};

/// A [`Record`] served by a partner collection without an item endpoint.
pub trait PartnerResource: Record {
    const PATH: &'static str;

    type Wire: Serialize + DeserializeOwned + Into<Self> + for<'a> From<&'a Self> + Send + Sync;
}

impl PartnerResource for Department {
    const PATH: &'static str = paths::DEPARTMENTS;
    type Wire = PartnerDepartment;
}

impl PartnerResource for Project {
    const PATH: &'static str = paths::PROJECTS;
    type Wire = PartnerProject;
}

impl PartnerResource for Stage {
    const PATH: &'static str = paths::STAGES;
    type Wire = PartnerStage;
}

pub struct ExternalRecords<E> {
    connector: Connector,
    _entity: PhantomData<fn() -> E>,
}

impl<E: PartnerResource> ExternalRecords<E> {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            _entity: PhantomData,
        }
    }

    async fn fetch_all(&self) -> CoreResult<Vec<E>> {
        let rows: Vec<E::Wire> = self.connector.list(E::PATH).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl<E: PartnerResource> Repository<E> for ExternalRecords<E> {
    async fn create(&self, tenant: &TenantId, input: E::Create) -> CoreResult<E> {
        let record = E::from_create(Uuid::new_v4(), input)?;
        let created: E::Wire = self
            .connector
            .create(E::PATH, &E::Wire::from(&record))
            .await?;
        debug!(%tenant, kind = E::KIND, id = %record.id(), "Created partner record");
        Ok(created.into())
    }

    // No item endpoint: scan the collection.
    async fn get(&self, _tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<E> {
        self.fetch_all()
            .await?
            .into_iter()
            .find(|record| record.id() == id)
            .ok_or_else(|| CoreError::NotFound(format!("{} {id}", E::KIND)))
    }

    async fn get_all(
        &self,
        _tenant: &TenantId,
        filter: &E::Filter,
        _use_cache: bool,
    ) -> CoreResult<Vec<E>> {
        let mut records: Vec<E> = self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|record| record.matches(filter))
            .collect();
        E::sort(&mut records);
        Ok(records)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: E::Update) -> CoreResult<E> {
        let mut record = self.get(tenant, id, false).await?;
        record.apply_update(input)?;
        let replaced: Option<E::Wire> = self
            .connector
            .replace(E::PATH, &id.to_string(), &E::Wire::from(&record))
            .await?;
        debug!(%tenant, kind = E::KIND, %id, "Updated partner record");
        replaced
            .map(Into::into)
            .ok_or_else(|| CoreError::NotFound(format!("{} {id}", E::KIND)))
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.connector.delete(E::PATH, &id.to_string()).await? {
            return Err(CoreError::NotFound(format!("{} {id}", E::KIND)));
        }
        debug!(%tenant, kind = E::KIND, %id, "Deleted partner record");
        Ok(())
    }
}
