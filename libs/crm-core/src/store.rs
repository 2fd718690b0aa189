//! Query vocabulary for [`crate::DocumentStore`].
//!
//! Field and collection names come from code, never from callers; values are
//! always bound as text.

use serde_json::Value;

pub mod collections {
    pub const CLIENTS: &str = "clients";
    pub const CONTACT_PERSONS: &str = "contact_persons";
    pub const DEPARTMENTS: &str = "departments";
    pub const PROJECTS: &str = "projects";
    pub const PERFORMERS: &str = "performers";
    pub const STAGES: &str = "stages";
    pub const TICKETS: &str = "tickets";
    pub const SETTINGS: &str = "settings";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(&'static str, String),
    In(&'static str, Vec<String>),
}

/// Conjunction of equality/membership tests on top-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocFilter {
    conditions: Vec<Condition>,
}

impl DocFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl ToString) -> Self {
        self.conditions.push(Condition::Eq(field, value.to_string()));
        self
    }

    pub fn any_of<I, V>(mut self, field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.conditions.push(Condition::In(
            field,
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(field, expected) => field_text(doc, field).as_deref() == Some(expected),
            Condition::In(field, allowed) => field_text(doc, field)
                .map(|value| allowed.contains(&value))
                .unwrap_or(false),
        })
    }
}

/// Text form of a top-level field, as the Postgres `->>` operator renders it.
pub fn field_text(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Joins the document whose id equals `local_field` from `from` into
/// `as_field`, or `null` when there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub from: &'static str,
    pub local_field: &'static str,
    pub as_field: &'static str,
}

/// Match stage followed by lookup stages, run server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub collection: &'static str,
    pub filter: DocFilter,
    pub lookups: Vec<Lookup>,
}
