#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use crm_core::adapters::{
    InMemoryCache, InMemoryDocumentStore, InMemoryIdentityDirectory, InMemoryMappingStore,
    InMemorySecretStore,
};
use crm_core::domain::identity::{IdentityUser, NewIdentityUser};
use crm_core::external::ConnectorConfig;
use crm_core::factory::BackendFactory;
use crm_core::settings::TenantSettingsStore;
use crm_core::{IdentityDirectory, TenantId};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const TOKEN: &str = "partner-token";

/// In-process partner API: `/api/{token}/{kind}` and `/api/{token}/{kind}/{id}`.
/// Only clients and tickets answer item GETs, like the real partner.
#[derive(Clone, Default)]
pub struct FakePartner {
    rows: Arc<DashMap<String, Vec<Value>>>,
    failures: Arc<DashMap<String, StatusCode>>,
}

impl FakePartner {
    pub fn seed(&self, kind: &str, row: Value) {
        self.rows.entry(kind.to_string()).or_default().push(row);
    }

    pub fn rows(&self, kind: &str) -> Vec<Value> {
        self.rows.get(kind).map(|rows| rows.value().clone()).unwrap_or_default()
    }

    /// Replaces the row with the same `guid`, or appends it.
    pub fn upsert(&self, kind: &str, row: Value) {
        let mut rows = self.rows.entry(kind.to_string()).or_default();
        match rows.iter().position(|existing| existing["guid"] == row["guid"]) {
            Some(index) => rows[index] = row,
            None => rows.push(row),
        }
    }

    /// Every request for `kind` answers with `status` from now on.
    pub fn fail(&self, kind: &str, status: StatusCode) {
        self.failures.insert(kind.to_string(), status);
    }

    pub fn heal(&self, kind: &str) {
        self.failures.remove(kind);
    }

    fn check(&self, token: &str, kind: &str) -> Result<(), Response> {
        if token != TOKEN {
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }
        if let Some(status) = self.failures.get(kind) {
            return Err((*status, "injected failure").into_response());
        }
        Ok(())
    }

    fn position(&self, kind: &str, id: &str) -> Option<usize> {
        self.rows
            .get(kind)?
            .iter()
            .position(|row| row["guid"].as_str() == Some(id))
    }
}

async fn list(
    State(partner): State<FakePartner>,
    Path((token, kind)): Path<(String, String)>,
) -> Response {
    if let Err(rejected) = partner.check(&token, &kind) {
        return rejected;
    }
    Json(Value::Array(partner.rows(&kind))).into_response()
}

async fn create(
    State(partner): State<FakePartner>,
    Path((token, kind)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejected) = partner.check(&token, &kind) {
        return rejected;
    }
    partner.seed(&kind, body.clone());
    Json(body).into_response()
}

async fn item(
    State(partner): State<FakePartner>,
    Path((token, kind, id)): Path<(String, String, String)>,
) -> Response {
    if let Err(rejected) = partner.check(&token, &kind) {
        return rejected;
    }
    if kind != "clients" && kind != "tickets" {
        return StatusCode::NOT_FOUND.into_response();
    }
    let row = partner
        .position(&kind, &id)
        .and_then(|index| partner.rows.get(&kind).map(|rows| rows.value()[index].clone()))
        .unwrap_or(Value::Null);
    Json(row).into_response()
}

async fn replace(
    State(partner): State<FakePartner>,
    Path((token, kind, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejected) = partner.check(&token, &kind) {
        return rejected;
    }
    let Some(index) = partner.position(&kind, &id) else {
        return Json(Value::Null).into_response();
    };
    if let Some(mut rows) = partner.rows.get_mut(&kind) {
        rows[index] = body.clone();
    }
    Json(body).into_response()
}

async fn remove(
    State(partner): State<FakePartner>,
    Path((token, kind, id)): Path<(String, String, String)>,
) -> Response {
    if let Err(rejected) = partner.check(&token, &kind) {
        return rejected;
    }
    let deleted = match partner.position(&kind, &id) {
        Some(index) => {
            if let Some(mut rows) = partner.rows.get_mut(&kind) {
                rows.remove(index);
            }
            true
        }
        None => false,
    };
    Json(json!({ "deleted": deleted })).into_response()
}

/// Serves a fresh fake partner and returns it with its base URL.
pub async fn spawn_partner() -> (FakePartner, String) {
    let partner = FakePartner::default();
    let router = Router::new()
        .route("/api/{token}/{kind}", get(list).post(create))
        .route("/api/{token}/{kind}/{id}", get(item).put(replace).delete(remove))
        .with_state(partner.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (partner, format!("http://{addr}/api"))
}

/// A base URL nothing listens on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}

pub fn tenant(name: &str) -> TenantId {
    TenantId::parse(name).unwrap()
}

pub fn connector_config() -> ConnectorConfig {
    ConnectorConfig {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        ..ConnectorConfig::default()
    }
}

/// In-memory collaborators shared by a test.
pub struct World {
    pub store: Arc<InMemoryDocumentStore>,
    pub identity: Arc<InMemoryIdentityDirectory>,
    pub mappings: Arc<InMemoryMappingStore>,
    pub secrets: Arc<InMemorySecretStore>,
    pub cache: Arc<InMemoryCache>,
    pub settings: TenantSettingsStore,
    pub factory: BackendFactory,
}

impl World {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let identity = Arc::new(InMemoryIdentityDirectory::new());
        let mappings = Arc::new(InMemoryMappingStore::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        let cache = Arc::new(InMemoryCache::default());
        let settings = TenantSettingsStore::new(store.clone(), secrets.clone());
        let factory = BackendFactory::new(
            store.clone(),
            identity.clone(),
            mappings.clone(),
            cache.clone(),
            settings.clone(),
            connector_config(),
        );
        Self {
            store,
            identity,
            mappings,
            secrets,
            cache,
            settings,
            factory,
        }
    }

    pub async fn user(&self, tenant: &TenantId, login: &str, display_name: &str) -> IdentityUser {
        self.identity
            .create(
                tenant,
                NewIdentityUser {
                    login: login.into(),
                    display_name: display_name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }
}

/// Partner-side performer row as the partner directory would return it.
pub fn partner_performer(guid: uuid::Uuid, login: &str, full_name: &str) -> Value {
    json!({
        "guid": guid,
        "userGuid": null,
        "fullName": full_name,
        "login": login,
        "email": format!("{login}@example.com"),
        "avatarUrl": null,
        "departmentGuid": null,
        "position": null,
    })
}
