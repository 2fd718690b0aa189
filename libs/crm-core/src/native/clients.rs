use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{decode, encode};
use crate::domain::client::{Client, ClientUpdate, ContactPerson, NewClient};
use crate::repository::NoFilter;
use crate::store::{collections, DocFilter};
use crate::{CoreError, CoreResult, DocumentStore, Entity, Repository, TenantId};

/// Client document without its contacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ClientDoc {
    pub id: Uuid,
    pub name: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientDoc {
    fn from_client(client: &Client) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            version: client.version,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }

    pub(crate) fn into_client(self, contacts: Vec<ContactPerson>) -> Client {
        Client {
            id: self.id,
            name: self.name,
            contacts,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One contact person; `position` keeps the caller's ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactDoc {
    #[serde(flatten)]
    contact: ContactPerson,
    position: usize,
}

/// Contacts of the given clients, grouped by client and in stored order.
pub(crate) async fn load_contacts(
    store: &dyn DocumentStore,
    tenant: &TenantId,
    client_ids: &[Uuid],
) -> CoreResult<HashMap<Uuid, Vec<ContactPerson>>> {
    if client_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let docs = store
        .find(
            tenant,
            collections::CONTACT_PERSONS,
            &DocFilter::all().any_of("client_id", client_ids),
        )
        .await?;

    let mut rows = docs
        .into_iter()
        .map(|doc| decode::<ContactDoc>(collections::CONTACT_PERSONS, doc))
        .collect::<CoreResult<Vec<_>>>()?;
    rows.sort_by_key(|row| row.position);

    let mut grouped: HashMap<Uuid, Vec<ContactPerson>> = HashMap::new();
    for row in rows {
        grouped.entry(row.contact.client_id).or_default().push(row.contact);
    }
    Ok(grouped)
}

pub struct NativeClients {
    store: Arc<dyn DocumentStore>,
}

impl NativeClients {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn not_found(id: Uuid) -> CoreError {
        CoreError::NotFound(format!("{} {id}", Client::KIND))
    }

    /// Current owner of every stored contact that `client` lists.
    async fn contact_owners(&self, tenant: &TenantId, client: &Client) -> CoreResult<HashMap<Uuid, Uuid>> {
        if client.contacts.is_empty() {
            return Ok(HashMap::new());
        }
        let docs = self
            .store
            .find(
                tenant,
                collections::CONTACT_PERSONS,
                &DocFilter::all().any_of("id", client.contacts.iter().map(|c| c.id)),
            )
            .await?;
        docs.into_iter()
            .map(|doc| {
                decode::<ContactDoc>(collections::CONTACT_PERSONS, doc)
                    .map(|row| (row.contact.id, row.contact.client_id))
            })
            .collect()
    }

    async fn write_contacts(&self, tenant: &TenantId, client: &Client) -> CoreResult<()> {
        for (position, contact) in client.contacts.iter().enumerate() {
            let doc = encode(&ContactDoc {
                contact: contact.clone(),
                position,
            })?;
            self.store
                .upsert(tenant, collections::CONTACT_PERSONS, contact.id, doc)
                .await?;
        }
        Ok(())
    }

    async fn drop_contacts(&self, tenant: &TenantId, client_id: Uuid) -> CoreResult<u64> {
        self.store
            .delete_many(
                tenant,
                collections::CONTACT_PERSONS,
                &DocFilter::all().eq("client_id", client_id),
            )
            .await
    }
}

#[async_trait]
impl Repository<Client> for NativeClients {
    async fn create(&self, tenant: &TenantId, input: NewClient) -> CoreResult<Client> {
        let client = Client::new(Uuid::new_v4(), input, Utc::now())?;
        client.check_contact_owners(&self.contact_owners(tenant, &client).await?)?;
        self.store
            .insert(
                tenant,
                collections::CLIENTS,
                client.id,
                encode(&ClientDoc::from_client(&client))?,
            )
            .await?;
        self.write_contacts(tenant, &client).await?;
        debug!(%tenant, id = %client.id, contacts = client.contacts.len(), "Created client");
        Ok(client)
    }

    async fn get(&self, tenant: &TenantId, id: Uuid, _use_cache: bool) -> CoreResult<Client> {
        let doc = self
            .store
            .get(tenant, collections::CLIENTS, id)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        let client_doc: ClientDoc = decode(collections::CLIENTS, doc)?;
        let mut contacts = load_contacts(self.store.as_ref(), tenant, &[id]).await?;
        Ok(client_doc.into_client(contacts.remove(&id).unwrap_or_default()))
    }

    async fn get_all(
        &self,
        tenant: &TenantId,
        _filter: &NoFilter,
        _use_cache: bool,
    ) -> CoreResult<Vec<Client>> {
        let docs = self
            .store
            .find(tenant, collections::CLIENTS, &DocFilter::all())
            .await?;
        let client_docs = docs
            .into_iter()
            .map(|doc| decode::<ClientDoc>(collections::CLIENTS, doc))
            .collect::<CoreResult<Vec<_>>>()?;
        let ids: Vec<Uuid> = client_docs.iter().map(|doc| doc.id).collect();
        let mut contacts = load_contacts(self.store.as_ref(), tenant, &ids).await?;

        let mut clients: Vec<Client> = client_docs
            .into_iter()
            .map(|doc| {
                let own = contacts.remove(&doc.id).unwrap_or_default();
                doc.into_client(own)
            })
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    async fn update(&self, tenant: &TenantId, id: Uuid, input: ClientUpdate) -> CoreResult<Client> {
        let mut client = self.get(tenant, id, false).await?;
        let replaces_contacts = input.contacts.is_some();
        client.apply_update(input, Utc::now())?;
        if replaces_contacts {
            client.check_contact_owners(&self.contact_owners(tenant, &client).await?)?;
        }

        if !self
            .store
            .replace(
                tenant,
                collections::CLIENTS,
                id,
                encode(&ClientDoc::from_client(&client))?,
            )
            .await?
        {
            return Err(Self::not_found(id));
        }
        if replaces_contacts {
            self.drop_contacts(tenant, id).await?;
            self.write_contacts(tenant, &client).await?;
        }
        debug!(%tenant, %id, version = client.version, "Updated client");
        Ok(client)
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        if !self.store.delete(tenant, collections::CLIENTS, id).await? {
            return Err(Self::not_found(id));
        }
        let contacts = self.drop_contacts(tenant, id).await?;
        debug!(%tenant, %id, contacts, "Deleted client");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use crate::domain::client::ContactPersonInput;

    fn contact(name: &str) -> ContactPersonInput {
        ContactPersonInput {
            name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn contacts_are_stored_separately_and_reassembled_in_order() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = NativeClients::new(store.clone());
        let acme = TenantId::parse("acme").unwrap();

        let created = repo
            .create(
                &acme,
                NewClient {
                    name: "Acme".into(),
                    contacts: vec![contact("Zed"), contact("Ann"), contact("Mia")],
                },
            )
            .await
            .unwrap();

        let stored = store
            .find(&acme, collections::CONTACT_PERSONS, &DocFilter::all())
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);

        let fetched = repo.get(&acme, created.id, false).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn replacing_contacts_drops_the_old_ones() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = NativeClients::new(store.clone());
        let acme = TenantId::parse("acme").unwrap();
        let created = repo
            .create(
                &acme,
                NewClient {
                    name: "Acme".into(),
                    contacts: vec![contact("Ann"), contact("Bob")],
                },
            )
            .await
            .unwrap();

        let updated = repo
            .update(
                &acme,
                created.id,
                ClientUpdate {
                    name: None,
                    contacts: Some(vec![contact("Cid")]),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let fetched = repo.get(&acme, created.id, false).await.unwrap();
        assert_eq!(fetched.contacts.len(), 1);
        assert_eq!(fetched.contacts[0].name, "Cid");

        repo.delete(&acme, created.id).await.unwrap();
        assert!(store
            .find(&acme, collections::CONTACT_PERSONS, &DocFilter::all())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn contacts_of_another_client_are_left_alone() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = NativeClients::new(store.clone());
        let acme = TenantId::parse("acme").unwrap();
        let owner = repo
            .create(
                &acme,
                NewClient {
                    name: "Owner".into(),
                    contacts: vec![contact("Ann")],
                },
            )
            .await
            .unwrap();
        let other = repo
            .create(
                &acme,
                NewClient {
                    name: "Other".into(),
                    contacts: vec![],
                },
            )
            .await
            .unwrap();

        let err = repo
            .update(
                &acme,
                other.id,
                ClientUpdate {
                    name: Some("Renamed".into()),
                    contacts: Some(vec![ContactPersonInput {
                        id: Some(owner.contacts[0].id),
                        ..contact("Stolen")
                    }]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));

        assert_eq!(repo.get(&acme, owner.id, false).await.unwrap(), owner);
        assert_eq!(repo.get(&acme, other.id, false).await.unwrap(), other);
    }
}
