use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::{Department, Performer, Project, Stage};
use super::client::{Client, ContactPerson};
use super::{parse_optional_ref, require_non_empty};
use crate::repository::{Entity, ListFilter};
use crate::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Foreign references held by a ticket. None of them is enforced by the
/// storage layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRefs {
    pub client_id: Option<Uuid>,
    pub contact_person_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub performer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
}

/// References as supplied by callers, validated field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketRefsInput {
    pub client_id: Option<String>,
    pub contact_person_id: Option<String>,
    pub department_id: Option<String>,
    pub performer_id: Option<String>,
    pub project_id: Option<String>,
    pub stage_id: Option<String>,
}

impl TicketRefsInput {
    pub fn parse(&self) -> Result<TicketRefs, CoreError> {
        let refs = TicketRefs {
            client_id: parse_optional_ref("client_id", self.client_id.as_deref())?,
            contact_person_id: parse_optional_ref(
                "contact_person_id",
                self.contact_person_id.as_deref(),
            )?,
            department_id: parse_optional_ref("department_id", self.department_id.as_deref())?,
            performer_id: parse_optional_ref("performer_id", self.performer_id.as_deref())?,
            project_id: parse_optional_ref("project_id", self.project_id.as_deref())?,
            stage_id: parse_optional_ref("stage_id", self.stage_id.as_deref())?,
        };
        if refs.contact_person_id.is_some() && refs.client_id.is_none() {
            return Err(CoreError::invalid_input(
                "contact_person_id",
                "a contact person requires a client",
            ));
        }
        Ok(refs)
    }
}

impl TicketRefs {
    /// A contact person, when set, must belong to the ticket's client.
    pub fn check_contact(&self, client: Option<&Client>) -> Result<(), CoreError> {
        let Some(contact_id) = self.contact_person_id else {
            return Ok(());
        };
        match client {
            Some(client) if client.contact(contact_id).is_some() => Ok(()),
            _ => Err(CoreError::invalid_input(
                "contact_person_id",
                format!("contact person {contact_id} does not belong to the ticket's client"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPlanning {
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_finish: Option<DateTime<Utc>>,
    pub estimate_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketTracking {
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spent_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub at: DateTime<Utc>,
    pub author: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeedEntry {
    pub author: Option<Uuid>,
    pub text: String,
}

/// The persisted, reference-only part of a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(flatten)]
    pub refs: TicketRefs,
    #[serde(default)]
    pub planning: TicketPlanning,
    #[serde(default)]
    pub tracking: TicketTracking,
    /// Append-only.
    #[serde(default)]
    pub feed: Vec<FeedEntry>,
    pub close_date: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Composite ticket view with every reference resolved. A dangling
/// reference resolves to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(flatten)]
    pub record: TicketRecord,
    pub client: Option<Client>,
    pub contact_person: Option<ContactPerson>,
    pub department: Option<Department>,
    pub performer: Option<Performer>,
    pub project: Option<Project>,
    pub stage: Option<Stage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTicket {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub refs: TicketRefsInput,
    #[serde(default)]
    pub planning: TicketPlanning,
    #[serde(default)]
    pub tracking: TicketTracking,
    #[serde(default)]
    pub feed: Vec<NewFeedEntry>,
    pub close_date: Option<DateTime<Utc>>,
}

/// `None` keeps the current value. `refs` replaces all references at once.
/// Feed entries can only be appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub files: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub refs: Option<TicketRefsInput>,
    pub planning: Option<TicketPlanning>,
    pub tracking: Option<TicketTracking>,
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reopen: bool,
    #[serde(default)]
    pub append_feed: Vec<NewFeedEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub department_id: Option<Uuid>,
    pub performer_id: Option<Uuid>,
}

impl ListFilter for TicketFilter {
    fn cache_suffix(&self) -> String {
        let part = |id: Option<Uuid>| id.map_or_else(|| "*".to_string(), |id| id.to_string());
        format!(
            "dept={};perf={}",
            part(self.department_id),
            part(self.performer_id)
        )
    }
}

impl TicketFilter {
    pub fn matches(&self, record: &TicketRecord) -> bool {
        self.department_id
            .is_none_or(|id| record.refs.department_id == Some(id))
            && self
                .performer_id
                .is_none_or(|id| record.refs.performer_id == Some(id))
    }
}

fn feed_entries(entries: Vec<NewFeedEntry>, now: DateTime<Utc>) -> Result<Vec<FeedEntry>, CoreError> {
    entries
        .into_iter()
        .map(|entry| {
            require_non_empty("feed.text", &entry.text)?;
            Ok(FeedEntry {
                at: now,
                author: entry.author,
                text: entry.text,
            })
        })
        .collect()
}

impl TicketRecord {
    /// References must already be validated, see [`TicketRefsInput::parse`].
    pub fn new(
        id: Uuid,
        input: NewTicket,
        refs: TicketRefs,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        require_non_empty("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name,
            description: input.description,
            files: input.files,
            priority: input.priority,
            refs,
            planning: input.planning,
            tracking: input.tracking,
            feed: feed_entries(input.feed, now)?,
            close_date: input.close_date,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(
        &mut self,
        update: TicketUpdate,
        refs: Option<TicketRefs>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if let Some(name) = &update.name {
            require_non_empty("name", name)?;
        }
        let appended = feed_entries(update.append_feed, now)?;

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(files) = update.files {
            self.files = files;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(refs) = refs {
            self.refs = refs;
        }
        if let Some(planning) = update.planning {
            self.planning = planning;
        }
        if let Some(tracking) = update.tracking {
            self.tracking = tracking;
        }
        if update.reopen {
            self.close_date = None;
        } else if let Some(close_date) = update.close_date {
            self.close_date = Some(close_date);
        }
        self.feed.extend(appended);
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }
}

impl Ticket {
    /// Builds the composite view. The contact person is taken from the
    /// resolved client.
    pub fn assemble(
        record: TicketRecord,
        client: Option<Client>,
        department: Option<Department>,
        performer: Option<Performer>,
        project: Option<Project>,
        stage: Option<Stage>,
    ) -> Self {
        let contact_person = match (record.refs.contact_person_id, client.as_ref()) {
            (Some(contact_id), Some(client)) => client.contact(contact_id).cloned(),
            _ => None,
        };
        Self {
            record,
            client,
            contact_person,
            department,
            performer,
            project,
            stage,
        }
    }

    pub fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
    }
}

impl Entity for Ticket {
    const KIND: &'static str = "tickets";
    const CACHE_TTL_SECONDS: u64 = 20;

    type Create = NewTicket;
    type Update = TicketUpdate;
    type Filter = TicketFilter;

    fn id(&self) -> Uuid {
        self.record.id
    }

    /// {unfiltered, by department} x {unfiltered, by performer}.
    fn list_filters(&self) -> Vec<TicketFilter> {
        let departments = [None, self.record.refs.department_id];
        let performers = [None, self.record.refs.performer_id];
        let mut filters = Vec::with_capacity(4);
        for department_id in departments {
            for performer_id in performers {
                let filter = TicketFilter {
                    department_id,
                    performer_id,
                };
                if !filters.contains(&filter) {
                    filters.push(filter);
                }
            }
        }
        filters
    }
}
