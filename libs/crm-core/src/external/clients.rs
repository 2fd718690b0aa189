use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::connector::Connector;
use super::models::{paths, PartnerClient};
use crate::domain::client::{Client, ClientUpdate, NewClient};
use crate::repository::NoFilter;
use crate::{CoreError, CoreResult, Entity, Repository, TenantId};

pub struct ExternalClients {
    connector: Connector,
}

impl ExternalClients {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", Client::KIND))
    }

    /// Contacts are nested in the partner's client rows, so ownership is
    /// read from the full client list.
    async fn check_contact_owners(&self, client: &Client) -> CoreResult<()> {
        if client.contacts.is_empty() {
            return Ok(());
        }
        let rows: Vec<PartnerClient> = self.connector.list(paths::CLIENTS).await?;
        let owners: HashMap<Uuid, Uuid> = rows
            .into_iter()
            .map(Client::from)
            .flat_map(|other| other.contacts)
            .map(|contact| (contact.id, contact.client_id))
            .collect();
        client.check_contact_owners(&owners)
    }
}

#[async_trait]
impl Repository<Client> for ExternalClients {
    async fn create(&self, tenant: &TenantId, input: NewClient) -> CoreResult<Client> {
        let client = Client::new(Uuid::new_v4(), input, Utc::now())?;
        self.check_contact_owners(&client).await?;
        let created: PartnerClient = self
            .connector
            .create(paths::CLIENTS, &PartnerClient::from(&client))
            .await?;
        debug!(%tenant, id = %client.id, "Created partner client");
        Ok(created.into())
    }

    async fn get(&self, _tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Client> {
        self.connector
            .item::<PartnerClient>(paths::CLIENTS, &id.to_string())
            .await?
            .map(Client::from)
            .ok_or_else(|| Self::not_found(id))
    }

    async fn get_all(
        &self,
        _tenant: &TenantId,
        _filter: &NoFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Client>> {
        let rows: Vec<PartnerClient> = self.connector.list(paths::CLIENTS).await?;
        let mut clients: Vec<Client> = rows.into_iter().map(Client::from).collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: ClientUpdate) -> CoreResult<Client> {
        let mut client = self.get(tenant, id, false).await?;
        let replaces_contacts = input.contacts.is_some();
        client.apply_update(input, Utc::now())?;
        if replaces_contacts {
            self.check_contact_owners(&client).await?;
        }
        let replaced: Option<PartnerClient> = self
            .connector
            .replace(paths::CLIENTS, &id.to_string(), &PartnerClient::from(&client))
            .await?;
        debug!(%tenant, %id, version = client.version, "Updated partner client");
        replaced.map(Client::from).ok_or_else(|| Self::not_found(id))
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.connector.delete(paths::CLIENTS, &id.to_string()).await? {
            return Err(Self::not_found(id));
        }
        debug!(%tenant, %id, "Deleted partner client");
        Ok(())
    }
}
