//! Native backend: the tenant's own document database.
//!
//! Each tenant is a namespace of the [`DocumentStore`]. Client contacts live
//! in their own collection; tickets store references only and are hydrated
//! on read.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::domain::catalog::{Department, Project, Stage};
use crate::domain::settings::BackendKind;
use crate::{Backend, CoreError, CoreResult, DocumentStore, IdentityDirectory};

mod clients;
mod performers;
mod records;
mod tickets;

pub use clients::NativeClients;
pub use performers::NativePerformers;
pub use records::{NativeRecord, NativeRecords};
pub use tickets::NativeTickets;

/// Builds the uncached native repositories for every tenant served by `store`.
pub fn backend(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityDirectory>) -> Backend {
    let clients = Arc::new(NativeClients::new(store.clone()));
    let departments = Arc::new(NativeRecords::<Department>::new(store.clone()));
    let projects = Arc::new(NativeRecords::<Project>::new(store.clone()));
    let stages = Arc::new(NativeRecords::<Stage>::new(store.clone()));
    let performers = Arc::new(NativePerformers::new(store.clone(), identity.clone()));
    let tickets = Arc::new(NativeTickets::new(
        store,
        identity,
        clients.clone(),
        departments.clone(),
        performers.clone(),
        projects.clone(),
        stages.clone(),
    ));

    Backend {
        kind: BackendKind::Native,
        clients,
        departments,
        projects,
        performers,
        stages,
        tickets,
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(kind: &str, doc: Value) -> CoreResult<T> {
    serde_json::from_value(doc)
        .map_err(|e| CoreError::Deserialization(format!("stored {kind} document: {e}")))
}
