//! ExternalERP backend: the same repository contract served by a partner's
//! HTTP API.
//!
//! Ids are assigned here and sent with every create. Clients and tickets
//! have item endpoints; every other kind is looked up by scanning its list.

use std::sync::Arc;

use crate::domain::catalog::{Department, Project, Stage};
use crate::domain::settings::{BackendKind, ExternalSettings};
use crate::{Backend, CoreResult, IdentityDirectory, MappingStore};

mod clients;
mod connector;
pub mod models;
mod performers;
mod records;
mod tickets;

pub use clients::ExternalClients;
pub use connector::{Connector, ConnectorConfig};
pub use performers::ExternalPerformers;
pub use records::{ExternalRecords, PartnerResource};
pub use tickets::ExternalTickets;

/// Builds the uncached partner repositories for one tenant. All of them
/// share a single [`Connector`].
pub fn backend(
    settings: &ExternalSettings,
    config: &ConnectorConfig,
    identity: Arc<dyn IdentityDirectory>,
    mappings: Arc<dyn MappingStore>,
) -> CoreResult<Backend> {
    let connector = Connector::new(settings, config)?;
    Ok(backend_with(connector, identity, mappings))
}

pub fn backend_with(
    connector: Connector,
    identity: Arc<dyn IdentityDirectory>,
    mappings: Arc<dyn MappingStore>,
) -> Backend {
    let clients = Arc::new(ExternalClients::new(connector.clone()));
    let departments = Arc::new(ExternalRecords::<Department>::new(connector.clone()));
    let projects = Arc::new(ExternalRecords::<Project>::new(connector.clone()));
    let stages = Arc::new(ExternalRecords::<Stage>::new(connector.clone()));
    let performers = Arc::new(ExternalPerformers::new(connector.clone(), identity, mappings));
    let tickets = Arc::new(ExternalTickets::new(
        connector,
        clients.clone(),
        departments.clone(),
        performers.clone(),
        projects.clone(),
        stages.clone(),
    ));

    Backend {
        kind: BackendKind::ExternalErp,
        clients,
        departments,
        projects,
        performers,
        stages,
        tickets,
    }
}
