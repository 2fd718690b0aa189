use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::clients::{load_contacts, ClientDoc};
use super::performers::{enrich_all, PerformerDoc};
use super::{decode, encode};
use crate::domain::catalog::{Department, Performer, Project, Stage};
use crate::domain::client::Client;
use crate::domain::ticket::{NewTicket, Ticket, TicketFilter, TicketRecord, TicketRefs, TicketUpdate};
use crate::repository::fetch_optional;
use crate::store::{collections, DocFilter, Lookup, Pipeline};
use crate::{
    CoreError, CoreResult, DocumentStore, Entity, IdentityDirectory, Repository, TenantId,
};

/// A ticket document with its references joined in by the store.
#[derive(Debug, Deserialize)]
struct TicketRow {
    #[serde(flatten)]
    record: TicketRecord,
    client: Option<ClientDoc>,
    department: Option<Department>,
    performer: Option<PerformerDoc>,
    project: Option<Project>,
    stage: Option<Stage>,
}

fn lookups() -> Vec<Lookup> {
    vec![
        Lookup {
            from: collections::CLIENTS,
            local_field: "client_id",
            as_field: "client",
        },
        Lookup {
            from: collections::DEPARTMENTS,
            local_field: "department_id",
            as_field: "department",
        },
        Lookup {
            from: collections::PERFORMERS,
            local_field: "performer_id",
            as_field: "performer",
        },
        Lookup {
            from: collections::PROJECTS,
            local_field: "project_id",
            as_field: "project",
        },
        Lookup {
            from: collections::STAGES,
            local_field: "stage_id",
            as_field: "stage",
        },
    ]
}

fn store_filter(filter: &TicketFilter) -> DocFilter {
    let mut doc_filter = DocFilter::all();
    if let Some(id) = filter.department_id {
        doc_filter = doc_filter.eq("department_id", id);
    }
    if let Some(id) = filter.performer_id {
        doc_filter = doc_filter.eq("performer_id", id);
    }
    doc_filter
}

/// Tickets of the native backend. A single ticket is hydrated by fanning out
/// to the sibling repositories; lists are joined inside the store.
pub struct NativeTickets {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityDirectory>,
    clients: Arc<dyn Repository<Client>>,
    departments: Arc<dyn Repository<Department>>,
    performers: Arc<dyn Repository<Performer>>,
    projects: Arc<dyn Repository<Project>>,
    stages: Arc<dyn Repository<Stage>>,
}

impl NativeTickets {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityDirectory>,
        clients: Arc<dyn Repository<Client>>,
        departments: Arc<dyn Repository<Department>>,
        performers: Arc<dyn Repository<Performer>>,
        projects: Arc<dyn Repository<Project>>,
        stages: Arc<dyn Repository<Stage>>,
    ) -> Self {
        Self {
            store,
            identity,
            clients,
            departments,
            performers,
            projects,
            stages,
        }
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", Ticket::KIND))
    }

    async fn load(&self, tenant: &TenantId, id: Uuid) -> CoreResult<TicketRecord> {
        let doc = self
            .store
            .get(tenant, collections::TICKETS, id)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        decode(collections::TICKETS, doc)
    }

    async fn check_contact(&self, tenant: &TenantId, refs: &TicketRefs) -> CoreResult<()> {
        if refs.contact_person_id.is_none() {
            return Ok(());
        }
        let client = fetch_optional(self.clients.as_ref(), tenant, refs.client_id).await?;
        refs.check_contact(client.as_ref())
    }

    /// Resolves the five references concurrently; dangling ones become `None`.
    async fn hydrate(&self, tenant: &TenantId, record: TicketRecord) -> CoreResult<Ticket> {
        let refs = record.refs;
        let (client, department, performer, project, stage) = tokio::try_join!(
            fetch_optional(self.clients.as_ref(), tenant, refs.client_id),
            fetch_optional(self.departments.as_ref(), tenant, refs.department_id),
            fetch_optional(self.performers.as_ref(), tenant, refs.performer_id),
            fetch_optional(self.projects.as_ref(), tenant, refs.project_id),
            fetch_optional(self.stages.as_ref(), tenant, refs.stage_id),
        )?;
        Ok(Ticket::assemble(
            record, client, department, performer, project, stage,
        ))
    }
}

#[async_trait]
impl Repository<Ticket> for NativeTickets {
    async fn create(&self, tenant: &TenantId, input: NewTicket) -> CoreResult<Ticket> {
        let refs = input.refs.parse()?;
        self.check_contact(tenant, &refs).await?;
        let record = TicketRecord::new(Uuid::new_v4(), input, refs, Utc::now())?;
        self.store
            .insert(tenant, collections::TICKETS, record.id, encode(&record)?)
            .await?;
        debug!(%tenant, id = %record.id, "Created ticket");
        self.hydrate(tenant, record).await
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Ticket> {
        let record = self.load(tenant, id).await?;
        self.hydrate(tenant, record).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        filter: &TicketFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Ticket>> {
        let pipeline = Pipeline {
            collection: collections::TICKETS,
            filter: store_filter(filter),
            lookups: lookups(),
        };
        let rows = self
            .store
            .aggregate(tenant, &pipeline)
            .await?
            .into_iter()
            .map(|doc| decode::<TicketRow>(collections::TICKETS, doc))
            .collect::<CoreResult<Vec<_>>>()?;

        // Contacts and identity fields are not part of the joined documents.
        let mut client_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|row| row.client.as_ref().map(|c| c.id))
            .collect();
        client_ids.sort_unstable();
        client_ids.dedup();
        let contacts = load_contacts(self.store.as_ref(), tenant, &client_ids).await?;

        let performer_docs: Vec<PerformerDoc> =
            rows.iter().filter_map(|row| row.performer.clone()).collect();
        let performers: HashMap<Uuid, Performer> =
            enrich_all(self.identity.as_ref(), tenant, performer_docs)
                .await?
                .into_iter()
                .map(|performer| (performer.id, performer))
                .collect();

        let mut tickets: Vec<Ticket> = rows
            .into_iter()
            .filter(|row| filter.matches(&row.record))
            .map(|row| {
                let client = row.client.map(|doc| {
                    let own = contacts.get(&doc.id).cloned().unwrap_or_default();
                    doc.into_client(own)
                });
                let performer = row
                    .performer
                    .and_then(|doc| performers.get(&doc.id).cloned());
                Ticket::assemble(
                    row.record,
                    client,
                    row.department,
                    performer,
                    row.project,
                    row.stage,
                )
            })
            .collect();
        Ticket::sort(&mut tickets);
        Ok(tickets)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: TicketUpdate) -> CoreResult<Ticket> {
        let mut record = self.load(tenant, id).await?;
        let refs = match &input.refs {
            Some(raw) => {
                let refs = raw.parse()?;
                self.check_contact(tenant, &refs).await?;
                Some(refs)
            }
            None => None,
        };
        record.apply_update(input, refs, Utc::now())?;
        if !self
            .store
            .replace(tenant, collections::TICKETS, id, encode(&record)?)
            .await?
        {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, version = record.version, "Updated ticket");
        self.hydrate(tenant, record).await
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.store.delete(tenant, collections::TICKETS, id).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Deleted ticket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDocumentStore, InMemoryIdentityDirectory};
    use crate::domain::catalog::NewDepartment;
    use crate::domain::client::{ContactPersonInput, NewClient};
    use crate::domain::ticket::TicketRefsInput;
    use crate::native;

    fn acme() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    fn native_backend() -> (crate::Backend, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let backend = native::backend(store.clone(), Arc::new(InMemoryIdentityDirectory::new()));
        (backend, store)
    }

    #[tokio::test]
    async fn single_get_and_list_hydrate_identically() {
        let (backend, _store) = native_backend();
        let client = backend
            .clients
            .create(
                &acme(),
                NewClient {
                    name: "Acme".into(),
                    contacts: vec![ContactPersonInput {
                        name: "Ann".into(),
                        ..Default::default()
                    }],
                },
            )
            .await
            .unwrap();
        let department = backend
            .departments
            .create(&acme(), NewDepartment { name: "Ops".into() })
            .await
            .unwrap();

        let ticket = backend
            .tickets
            .create(
                &acme(),
                NewTicket {
                    name: "Printer on fire".into(),
                    refs: TicketRefsInput {
                        client_id: Some(client.id.to_string()),
                        contact_person_id: Some(client.contacts[0].id.to_string()),
                        department_id: Some(department.id.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ticket.client.as_ref(), Some(&client));
        assert_eq!(ticket.contact_person.as_ref(), Some(&client.contacts[0]));
        assert_eq!(ticket.department.as_ref(), Some(&department));

        let listed = backend
            .tickets
            .get_all(&acme(), &TicketFilter::default(), false)
            .await
            .unwrap();
        assert_eq!(listed, vec![ticket.clone()]);
        assert_eq!(backend.tickets.get(&acme(), ticket.record.id, false).await.unwrap(), ticket);
    }

    #[tokio::test]
    async fn dangling_reference_hydrates_to_none() {
        let (backend, _store) = native_backend();
        let department = backend
            .departments
            .create(&acme(), NewDepartment { name: "Ops".into() })
            .await
            .unwrap();
        let ticket = backend
            .tickets
            .create(
                &acme(),
                NewTicket {
                    name: "Orphan".into(),
                    refs: TicketRefsInput {
                        department_id: Some(department.id.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        backend.departments.delete(&acme(), department.id).await.unwrap();

        let fetched = backend.tickets.get(&acme(), ticket.record.id, false).await.unwrap();
        assert_eq!(fetched.record.refs.department_id, Some(department.id));
        assert!(fetched.department.is_none());

        let listed = backend
            .tickets
            .get_all(
                &acme(),
                &TicketFilter {
                    department_id: Some(department.id),
                    performer_id: None,
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].department.is_none());
    }

    #[tokio::test]
    async fn foreign_contact_person_is_rejected_before_persisting() {
        let (backend, store) = native_backend();
        let client = backend
            .clients
            .create(
                &acme(),
                NewClient {
                    name: "Acme".into(),
                    contacts: vec![],
                },
            )
            .await
            .unwrap();

        let err = backend
            .tickets
            .create(
                &acme(),
                NewTicket {
                    name: "Bad contact".into(),
                    refs: TicketRefsInput {
                        client_id: Some(client.id.to_string()),
                        contact_person_id: Some(Uuid::new_v4().to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { ref field, .. } if field == "contact_person_id"));
        assert!(store
            .find(&acme(), collections::TICKETS, &DocFilter::all())
            .await
            .unwrap()
            .is_empty());
    }
}
