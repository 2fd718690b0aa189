use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::require_non_empty;
use crate::repository::{Entity, NoFilter};
use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPerson {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub not_relevant: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    /// Ordered as supplied by the caller.
    #[serde(default)]
    pub contacts: Vec<ContactPerson>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact person as supplied on create/update. A known `id` keeps the
/// contact's identity across updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPersonInput {
    pub id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub not_relevant: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    #[serde(default)]
    pub contacts: Vec<ContactPersonInput>,
}

/// `None` keeps the current value. `contacts` replaces the whole list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub contacts: Option<Vec<ContactPersonInput>>,
}

impl Client {
    pub fn new(id: Uuid, input: NewClient, now: DateTime<Utc>) -> Result<Self, CoreError> {
        require_non_empty("name", &input.name)?;
        let contacts = build_contacts(id, input.contacts)?;
        Ok(Self {
            id,
            name: input.name,
            contacts,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: ClientUpdate, now: DateTime<Utc>) -> Result<(), CoreError> {
        if let Some(name) = update.name {
            require_non_empty("name", &name)?;
            self.name = name;
        }
        if let Some(contacts) = update.contacts {
            self.contacts = build_contacts(self.id, contacts)?;
        }
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn contact(&self, id: Uuid) -> Option<&ContactPerson> {
        self.contacts.iter().find(|c| c.id == id)
    }

    /// Rejects contacts whose id already belongs to another client.
    /// `owners` maps known contact ids to their client.
    pub fn check_contact_owners(&self, owners: &HashMap<Uuid, Uuid>) -> Result<(), CoreError> {
        for (index, contact) in self.contacts.iter().enumerate() {
            if let Some(owner) = owners.get(&contact.id) {
                if *owner != self.id {
                    return Err(CoreError::invalid_input(
                        format!("contacts[{index}].id"),
                        format!("contact {} belongs to another client", contact.id),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn build_contacts(
    client_id: Uuid,
    inputs: Vec<ContactPersonInput>,
) -> Result<Vec<ContactPerson>, CoreError> {
    let mut seen = HashSet::new();
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            require_non_empty(&format!("contacts[{index}].name"), &input.name)?;
            if let Some(id) = input.id {
                if !seen.insert(id) {
                    return Err(CoreError::invalid_input(
                        format!("contacts[{index}].id"),
                        format!("contact {id} is listed twice"),
                    ));
                }
            }
            Ok(ContactPerson {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                client_id,
                name: input.name,
                email: input.email,
                phones: input.phones,
                not_relevant: input.not_relevant,
                comment: input.comment,
            })
        })
        .collect()
}

impl Entity for Client {
    const KIND: &'static str = "clients";
    const CACHE_TTL_SECONDS: u64 = 60;

    type Create = NewClient;
    type Update = ClientUpdate;
    type Filter = NoFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_filters(&self) -> Vec<NoFilter> {
        vec![NoFilter]
    }
}
