//! Partner wire shapes and their mapping onto the domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::{Department, Performer, Project, Stage};
use crate::domain::client::{Client, ContactPerson};
use crate::domain::ticket::{
    FeedEntry, Priority, TicketPlanning, TicketRecord, TicketRefs, TicketTracking,
};

pub mod paths {
    pub const CLIENTS: &str = "clients";
    pub const DEPARTMENTS: &str = "departments";
    pub const PROJECTS: &str = "projects";
    pub const PERFORMERS: &str = "performers";
    pub const STAGES: &str = "stages";
    pub const TICKETS: &str = "tickets";
}

fn or_epoch(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or(DateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerContact {
    pub guid: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub not_relevant: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerClient {
    pub guid: Uuid,
    pub title: String,
    #[serde(default)]
    pub contacts: Vec<PartnerContact>,
    #[serde(default)]
    pub version: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Client> for PartnerClient {
    fn from(client: &Client) -> Self {
        Self {
            guid: client.id,
            title: client.name.clone(),
            contacts: client
                .contacts
                .iter()
                .map(|c| PartnerContact {
                    guid: c.id,
                    name: c.name.clone(),
                    email: c.email.clone(),
                    phones: c.phones.clone(),
                    not_relevant: c.not_relevant,
                    comment: c.comment.clone(),
                })
                .collect(),
            version: client.version,
            created_at: Some(client.created_at),
            updated_at: Some(client.updated_at),
        }
    }
}

impl From<PartnerClient> for Client {
    fn from(wire: PartnerClient) -> Self {
        let id = wire.guid;
        Self {
            id,
            name: wire.title,
            contacts: wire
                .contacts
                .into_iter()
                .map(|c| ContactPerson {
                    id: c.guid,
                    client_id: id,
                    name: c.name,
                    email: c.email,
                    phones: c.phones,
                    not_relevant: c.not_relevant,
                    comment: c.comment,
                })
                .collect(),
            version: wire.version.max(1),
            created_at: or_epoch(wire.created_at),
            updated_at: or_epoch(wire.updated_at.or(wire.created_at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerDepartment {
    pub guid: Uuid,
    pub title: String,
}

impl From<&Department> for PartnerDepartment {
    fn from(d: &Department) -> Self {
        Self {
            guid: d.id,
            title: d.name.clone(),
        }
    }
}

impl From<PartnerDepartment> for Department {
    fn from(wire: PartnerDepartment) -> Self {
        Self {
            id: wire.guid,
            name: wire.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerProject {
    pub guid: Uuid,
    pub title: String,
    pub description: Option<String>,
}

impl From<&Project> for PartnerProject {
    fn from(p: &Project) -> Self {
        Self {
            guid: p.id,
            title: p.name.clone(),
            description: p.description.clone(),
        }
    }
}

impl From<PartnerProject> for Project {
    fn from(wire: PartnerProject) -> Self {
        Self {
            id: wire.guid,
            name: wire.title,
            description: wire.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerStage {
    pub guid: Uuid,
    pub title: String,
    #[serde(default)]
    pub sort_order: i32,
    pub department_guid: Uuid,
}

impl From<&Stage> for PartnerStage {
    fn from(s: &Stage) -> Self {
        Self {
            guid: s.id,
            title: s.name.clone(),
            sort_order: s.arrangement,
            department_guid: s.department_id,
        }
    }
}

impl From<PartnerStage> for Stage {
    fn from(wire: PartnerStage) -> Self {
        Self {
            id: wire.guid,
            name: wire.title,
            arrangement: wire.sort_order,
            department_id: wire.department_guid,
        }
    }
}

/// A member of the partner's user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPerformer {
    pub guid: Uuid,
    /// Platform identity linked to this performer, once known.
    pub user_guid: Option<Uuid>,
    pub full_name: String,
    pub login: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub department_guid: Option<Uuid>,
    pub position: Option<String>,
}

impl From<PartnerPerformer> for Performer {
    fn from(wire: PartnerPerformer) -> Self {
        Self {
            id: wire.guid,
            user_id: wire.user_guid,
            department_id: wire.department_guid,
            position: wire.position,
            display_name: Some(wire.full_name),
            avatar_url: wire.avatar_url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPlanning {
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_finish: Option<DateTime<Utc>>,
    pub estimate_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerTracking {
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spent_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerFeedEntry {
    pub at: DateTime<Utc>,
    pub author_guid: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerTicket {
    pub guid: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub client_guid: Option<Uuid>,
    pub contact_person_guid: Option<Uuid>,
    pub department_guid: Option<Uuid>,
    pub performer_guid: Option<Uuid>,
    pub project_guid: Option<Uuid>,
    pub stage_guid: Option<Uuid>,
    #[serde(default)]
    pub planning: PartnerPlanning,
    #[serde(default)]
    pub tracking: PartnerTracking,
    #[serde(default)]
    pub feed: Vec<PartnerFeedEntry>,
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&TicketRecord> for PartnerTicket {
    fn from(t: &TicketRecord) -> Self {
        Self {
            guid: t.id,
            title: t.name.clone(),
            description: t.description.clone(),
            files: t.files.clone(),
            priority: t.priority,
            client_guid: t.refs.client_id,
            contact_person_guid: t.refs.contact_person_id,
            department_guid: t.refs.department_id,
            performer_guid: t.refs.performer_id,
            project_guid: t.refs.project_id,
            stage_guid: t.refs.stage_id,
            planning: PartnerPlanning {
                planned_start: t.planning.planned_start,
                planned_finish: t.planning.planned_finish,
                estimate_hours: t.planning.estimate_hours,
            },
            tracking: PartnerTracking {
                started_at: t.tracking.started_at,
                spent_hours: t.tracking.spent_hours,
            },
            feed: t
                .feed
                .iter()
                .map(|e| PartnerFeedEntry {
                    at: e.at,
                    author_guid: e.author,
                    text: e.text.clone(),
                })
                .collect(),
            close_date: t.close_date,
            version: t.version,
            created_at: Some(t.created_at),
            updated_at: Some(t.updated_at),
        }
    }
}

impl From<PartnerTicket> for TicketRecord {
    fn from(wire: PartnerTicket) -> Self {
        Self {
            id: wire.guid,
            name: wire.title,
            description: wire.description,
            files: wire.files,
            priority: wire.priority,
            refs: TicketRefs {
                client_id: wire.client_guid,
                contact_person_id: wire.contact_person_guid,
                department_id: wire.department_guid,
                performer_id: wire.performer_guid,
                project_id: wire.project_guid,
                stage_id: wire.stage_guid,
            },
            planning: TicketPlanning {
                planned_start: wire.planning.planned_start,
                planned_finish: wire.planning.planned_finish,
                estimate_hours: wire.planning.estimate_hours,
            },
            tracking: TicketTracking {
                started_at: wire.tracking.started_at,
                spent_hours: wire.tracking.spent_hours,
            },
            feed: wire
                .feed
                .into_iter()
                .map(|e| FeedEntry {
                    at: e.at,
                    author: e.author_guid,
                    text: e.text,
                })
                .collect(),
            close_date: wire.close_date,
            version: wire.version.max(1),
            created_at: or_epoch(wire.created_at),
            updated_at: or_epoch(wire.updated_at.or(wire.created_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partner_client_maps_contacts_onto_owner() {
        let client_id = Uuid::new_v4();
        let contact_id = Uuid::new_v4();
        let wire: PartnerClient = serde_json::from_value(json!({
            "guid": client_id,
            "title": "Acme",
            "contacts": [{ "guid": contact_id, "name": "Ann", "notRelevant": true }],
        }))
        .unwrap();

        let client = Client::from(wire);
        assert_eq!(client.name, "Acme");
        assert_eq!(client.version, 1);
        assert_eq!(client.contacts[0].client_id, client_id);
        assert!(client.contacts[0].not_relevant);
    }

    #[test]
    fn partner_ticket_uses_guid_references() {
        let stage = Uuid::new_v4();
        let wire: PartnerTicket = serde_json::from_value(json!({
            "guid": Uuid::new_v4(),
            "title": "Broken printer",
            "priority": "high",
            "stageGuid": stage,
            "version": 4,
        }))
        .unwrap();

        let record = TicketRecord::from(wire);
        assert_eq!(record.refs.stage_id, Some(stage));
        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.version, 4);
        assert_eq!(PartnerTicket::from(&record).stage_guid, Some(stage));
    }

    #[test]
    fn unlinked_partner_performer_has_no_user() {
        let wire: PartnerPerformer = serde_json::from_value(json!({
            "guid": Uuid::new_v4(),
            "userGuid": null,
            "fullName": "Ann Smith",
            "login": "ann",
        }))
        .unwrap();

        let performer = Performer::from(wire);
        assert_eq!(performer.user_id, None);
        assert_eq!(performer.display_name.as_deref(), Some("Ann Smith"));
    }
}
