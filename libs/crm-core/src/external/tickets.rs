use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::connector::Connector;
use super::models::{
    paths, PartnerClient, PartnerDepartment, PartnerProject, PartnerStage, PartnerTicket,
};
use crate::domain::catalog::{Department, Performer, Project, Stage};
use crate::domain::client::Client;
use crate::domain::ticket::{NewTicket, Ticket, TicketFilter, TicketRecord, TicketRefs, TicketUpdate};
use crate::repository::{fetch_optional, NoFilter};
use crate::{CoreError, CoreResult, Entity, Repository, TenantId};

fn index<W, T, F>(rows: Vec<W>, id: F) -> HashMap<Uuid, T>
where
    W: Into<T>,
    F: Fn(&T) -> Uuid,
{
    rows.into_iter()
        .map(|row| {
            let item: T = row.into();
            (id(&item), item)
        })
        .collect()
}

/// Tickets held by the partner. Single reads fan out to the sibling
/// repositories; lists fetch every related collection once and join in memory.
pub struct ExternalTickets {
    connector: Connector,
    clients: Arc<dyn Repository<Client>>,
    departments: Arc<dyn Repository<Department>>,
    performers: Arc<dyn Repository<Performer>>,
    projects: Arc<dyn Repository<Project>>,
    stages: Arc<dyn Repository<Stage>>,
}

impl ExternalTickets {
    pub fn new(
        connector: Connector,
        clients: Arc<dyn Repository<Client>>,
        departments: Arc<dyn Repository<Department>>,
        performers: Arc<dyn Repository<Performer>>,
        projects: Arc<dyn Repository<Project>>,
        stages: Arc<dyn Repository<Stage>>,
    ) -> Self {
        Self {
            connector,
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

    async fn load(&self, id: Uuid) -> CoreResult<TicketRecord> {
        self.connector
            .item::<PartnerTicket>(paths::TICKETS, &id.to_string())
            .await?
            .map(TicketRecord::from)
            .ok_or_else(|| Self::not_found(id))
    }

    async fn check_contact(&self, tenant: &TenantId, refs: &TicketRefs) -> CoreResult<()> {
        if refs.contact_person_id.is_none() {
            return Ok(());
        }
        let client = fetch_optional(self.clients.as_ref(), tenant, refs.client_id).await?;
        refs.check_contact(client.as_ref())
    }

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
impl Repository<Ticket> for ExternalTickets {
    async fn create(&self, tenant: &TenantId, input: NewTicket) -> CoreResult<Ticket> {
        let refs = input.refs.parse()?;
        self.check_contact(tenant, &refs).await?;
        let record = TicketRecord::new(Uuid::new_v4(), input, refs, Utc::now())?;
        let created: PartnerTicket = self
            .connector
            .create(paths::TICKETS, &PartnerTicket::from(&record))
            .await?;
        debug!(%tenant, id = %record.id, "Created partner ticket");
        self.hydrate(tenant, created.into()).await
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Ticket> {
        let record = self.load(id).await?;
        self.hydrate(tenant, record).await
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        filter: &TicketFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<PartnerTicket> = self.connector.list(paths::TICKETS).await?;
        let records: Vec<TicketRecord> = rows
            .into_iter()
            .map(TicketRecord::from)
            .filter(|record| filter.matches(record))
            .collect();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let (clients, departments, performers, projects, stages) = tokio::try_join!(
            self.connector.list::<PartnerClient>(paths::CLIENTS),
            self.connector.list::<PartnerDepartment>(paths::DEPARTMENTS),
            self.performers.get_all(tenant, &NoFilter, false),
            self.connector.list::<PartnerProject>(paths::PROJECTS),
            self.connector.list::<PartnerStage>(paths::STAGES),
        )?;
        let clients = index(clients, |c: &Client| c.id);
        let departments = index(departments, |d: &Department| d.id);
        let performers = index(performers, |p: &Performer| p.id);
        let projects = index(projects, |p: &Project| p.id);
        let stages = index(stages, |s: &Stage| s.id);

        let mut tickets: Vec<Ticket> = records
            .into_iter()
            .map(|record| {
                let refs = record.refs;
                Ticket::assemble(
                    record,
                    refs.client_id.and_then(|id| clients.get(&id).cloned()),
                    refs.department_id.and_then(|id| departments.get(&id).cloned()),
                    refs.performer_id.and_then(|id| performers.get(&id).cloned()),
                    refs.project_id.and_then(|id| projects.get(&id).cloned()),
                    refs.stage_id.and_then(|id| stages.get(&id).cloned()),
                )
            })
            .collect();
        debug!(%tenant, count = tickets.len(), "Listed partner tickets");
        Ticket::sort(&mut tickets);
        Ok(tickets)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: TicketUpdate) -> CoreResult<Ticket> {
        let mut record = self.load(id).await?;
        let refs = match &input.refs {
            Some(raw) => {
                let refs = raw.parse()?;
                self.check_contact(tenant, &refs).await?;
                Some(refs)
            }
            None => None,
        };
        record.apply_update(input, refs, Utc::now())?;
        let replaced: Option<PartnerTicket> = self
            .connector
            .replace(paths::TICKETS, &id.to_string(), &PartnerTicket::from(&record))
            .await?;
        let record = replaced.map(TicketRecord::from).ok_or_else(|| Self::not_found(id))?;
        debug!(%tenant, %id, version = record.version, "Updated partner ticket");
        self.hydrate(tenant, record).await
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.connector.delete(paths::TICKETS, &id.to_string()).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Deleted partner ticket");
        Ok(())
    }
}
