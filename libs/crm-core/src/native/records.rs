use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{decode, encode};
use crate::domain::catalog::{Department, Project, Stage, StageFilter};
use crate::repository::NoFilter;
use crate::store::DocFilter;
use crate::{CoreError, CoreResult, DocumentStore, Record, Repository, TenantId};

/// A [`Record`] stored as-is in the collection named after its kind.
pub trait NativeRecord: Record {
    /// Store-side form of a list filter.
    fn store_filter(filter: &Self::Filter) -> DocFilter;
}

impl NativeRecord for Department {
    fn store_filter(_filter: &NoFilter) -> DocFilter {
        DocFilter::all()
    }
}

impl NativeRecord for Project {
    fn store_filter(_filter: &NoFilter) -> DocFilter {
        DocFilter::all()
    }
}

impl NativeRecord for Stage {
    fn store_filter(filter: &StageFilter) -> DocFilter {
        match filter.department_id {
            Some(id) => DocFilter::all().eq("department_id", id),
            None => DocFilter::all(),
        }
    }
}

pub struct NativeRecords<E> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: NativeRecord> NativeRecords<E> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", E::KIND))
    }
}

#[async_trait]
impl<E: NativeRecord> Repository<E> for NativeRecords<E> {
    async fn create(&self, tenant: &TenantId, input: E::Create) -> CoreResult<E> {
        let id = Uuid::new_v4();
        let record = E::from_create(id, input)?;
        self.store
            .insert(tenant, E::KIND, id, encode(&record)?)
            .await?;
        debug!(%tenant, kind = E::KIND, %id, "Created record");
        Ok(record)
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<E> {
        let doc = self
            .store
            .get(tenant, E::KIND, id)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        decode(E::KIND, doc)
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        filter: &E::Filter,
        _use_cache: bool,
    ) -> CoreResult<Vec<E>> {
        let docs = self
            .store
            .find(tenant, E::KIND, &E::store_filter(filter))
            .await?;
        let mut records = docs
            .into_iter()
            .map(|doc| decode::<E>(E::KIND, doc))
            .filter(|record| record.as_ref().map_or(true, |r| r.matches(filter)))
            .collect::<CoreResult<Vec<_>>>()?;
        E::sort(&mut records);
        Ok(records)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: E::Update) -> CoreResult<E> {
        let mut record = self.get(tenant, id, false).await?;
        record.apply_update(input)?;
        if !self
            .store
            .replace(tenant, E::KIND, id, encode(&record)?)
            .await?
        {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, kind = E::KIND, %id, "Updated record");
        Ok(record)
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.store.delete(tenant, E::KIND, id).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, kind = E::KIND, %id, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use crate::domain::catalog::{NewStage, StageUpdate};

    fn stages() -> NativeRecords<Stage> {
        NativeRecords::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn new_stage(name: &str, arrangement: i32, department_id: Uuid) -> NewStage {
        NewStage {
            name: name.into(),
            arrangement,
            department_id: department_id.to_string(),
        }
    }

    #[tokio::test]
    async fn stages_filter_by_department_in_arrangement_order() {
        let repo = stages();
        let acme = TenantId::parse("acme").unwrap();
        let ops = Uuid::new_v4();
        let sales = Uuid::new_v4();
        repo.create(&acme, new_stage("Done", 2, ops)).await.unwrap();
        repo.create(&acme, new_stage("Todo", 0, ops)).await.unwrap();
        repo.create(&acme, new_stage("Lead", 0, sales)).await.unwrap();

        let ops_stages = repo
            .get_all(&acme, &StageFilter { department_id: Some(ops) }, true)
            .await
            .unwrap();
        let names: Vec<_> = ops_stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Todo", "Done"]);
        assert_eq!(repo.get_all(&acme, &StageFilter::default(), true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_and_delete_missing_record_is_not_found() {
        let repo = stages();
        let acme = TenantId::parse("acme").unwrap();
        let missing = Uuid::new_v4();
        let update = StageUpdate {
            name: "x".into(),
            arrangement: 0,
            department_id: Uuid::new_v4().to_string(),
        };
        assert!(repo.update(&acme, missing, update).await.unwrap_err().is_not_found());
        assert!(repo.delete(&acme, missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn records_are_invisible_to_other_tenants() {
        let repo = stages();
        let acme = TenantId::parse("acme").unwrap();
        let globex = TenantId::parse("globex").unwrap();
        let stage = repo.create(&acme, new_stage("Todo", 0, Uuid::new_v4())).await.unwrap();

        assert!(repo.get(&globex, stage.id, false).await.unwrap_err().is_not_found());
        assert!(repo.get_all(&globex, &StageFilter::default(), false).await.unwrap().is_empty());
    }
}
