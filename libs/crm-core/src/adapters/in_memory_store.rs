use crate::store::{field_text, DocFilter, Pipeline};
use crate::{CoreError, CoreResult, DocumentStore, TenantId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type CollectionKey = (String, String);

/// In-memory implementation of the DocumentStore port for tests and
/// single-process mode.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    // (namespace, collection) -> id -> document
    collections: Arc<DashMap<CollectionKey, HashMap<Uuid, Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(ns: &TenantId, collection: &str) -> CollectionKey {
        (ns.as_str().to_string(), collection.to_string())
    }

    fn snapshot(&self, ns: &TenantId, collection: &str, filter: &DocFilter) -> Vec<Value> {
        self.collections
            .get(&Self::key(ns, collection))
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<()> {
        let mut docs = self.collections.entry(Self::key(ns, collection)).or_default();
        if docs.contains_key(&id) {
            return Err(CoreError::AlreadyExists(format!("{collection} {id}")));
        }
        docs.insert(id, doc);
        Ok(())
    }

    async fn get(&self, ns: &TenantId, collection: &str, id: Uuid) -> CoreResult<Option<Value>> {
        Ok(self
            .collections
            .get(&Self::key(ns, collection))
            .and_then(|docs| docs.get(&id).cloned()))
    }

    async fn find(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<Vec<Value>> {
        Ok(self.snapshot(ns, collection, filter))
    }

    async fn replace(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<bool> {
        let Some(mut docs) = self.collections.get_mut(&Self::key(ns, collection)) else {
            return Ok(false);
        };
        match docs.get_mut(&id) {
            Some(existing) => {
                *existing = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<()> {
        self.collections
            .entry(Self::key(ns, collection))
            .or_default()
            .insert(id, doc);
        Ok(())
    }

    async fn delete(&self, ns: &TenantId, collection: &str, id: Uuid) -> CoreResult<bool> {
        Ok(self
            .collections
            .get_mut(&Self::key(ns, collection))
            .map(|mut docs| docs.remove(&id).is_some())
            .unwrap_or(false))
    }

    async fn delete_many(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<u64> {
        let Some(mut docs) = self.collections.get_mut(&Self::key(ns, collection)) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|_, doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }

    async fn aggregate(&self, ns: &TenantId, pipeline: &Pipeline) -> CoreResult<Vec<Value>> {
        // Copy the matches out first so no shard guard is held across lookups.
        let mut docs = self.snapshot(ns, pipeline.collection, &pipeline.filter);
        for doc in &mut docs {
            for lookup in &pipeline.lookups {
                let joined = field_text(doc, lookup.local_field)
                    .and_then(|raw| Uuid::parse_str(&raw).ok())
                    .and_then(|id| {
                        self.collections
                            .get(&Self::key(ns, lookup.from))
                            .and_then(|docs| docs.get(&id).cloned())
                    })
                    .unwrap_or(Value::Null);
                if let Value::Object(fields) = doc {
                    fields.insert(lookup.as_field.to_string(), joined);
                }
            }
        }
        Ok(docs)
    }

    async fn namespaces(&self, collection: &str) -> CoreResult<Vec<TenantId>> {
        let mut found: Vec<TenantId> = self
            .collections
            .iter()
            .filter(|entry| entry.key().1 == collection && !entry.value().is_empty())
            .filter_map(|entry| TenantId::parse(&entry.key().0).ok())
            .collect();
        found.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Lookup;
    use serde_json::json;

    fn tenant(name: &str) -> TenantId {
        TenantId::parse(name).unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_taken_id() {
        let store = InMemoryDocumentStore::new();
        let acme = tenant("acme");
        let id = Uuid::new_v4();
        store.insert(&acme, "clients", id, json!({ "id": id })).await.unwrap();

        let err = store
            .insert(&acme, "clients", id, json!({ "id": id }))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = InMemoryDocumentStore::new();
        let id = Uuid::new_v4();
        store
            .insert(&tenant("acme"), "clients", id, json!({ "id": id }))
            .await
            .unwrap();

        assert!(store.get(&tenant("globex"), "clients", id).await.unwrap().is_none());
        assert!(!store.delete(&tenant("globex"), "clients", id).await.unwrap());
        assert!(store.get(&tenant("acme"), "clients", id).await.unwrap().is_some());
        assert_eq!(store.namespaces("clients").await.unwrap(), vec![tenant("acme")]);
        assert!(store.namespaces("tickets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_only_touches_existing_documents() {
        let store = InMemoryDocumentStore::new();
        let acme = tenant("acme");
        let id = Uuid::new_v4();
        assert!(!store.replace(&acme, "projects", id, json!({})).await.unwrap());

        store.upsert(&acme, "projects", id, json!({ "name": "a" })).await.unwrap();
        assert!(store.replace(&acme, "projects", id, json!({ "name": "b" })).await.unwrap());
        assert_eq!(
            store.get(&acme, "projects", id).await.unwrap(),
            Some(json!({ "name": "b" }))
        );
    }

    #[tokio::test]
    async fn delete_many_counts_removed() {
        let store = InMemoryDocumentStore::new();
        let acme = tenant("acme");
        let client_id = Uuid::new_v4();
        for owner in [client_id, client_id, Uuid::new_v4()] {
            let id = Uuid::new_v4();
            store
                .insert(&acme, "contact_persons", id, json!({ "id": id, "client_id": owner }))
                .await
                .unwrap();
        }

        let removed = store
            .delete_many(&acme, "contact_persons", &DocFilter::all().eq("client_id", client_id))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.find(&acme, "contact_persons", &DocFilter::all()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn aggregate_joins_or_nulls_each_lookup() {
        let store = InMemoryDocumentStore::new();
        let acme = tenant("acme");
        let department_id = Uuid::new_v4();
        store
            .insert(&acme, "departments", department_id, json!({ "id": department_id, "name": "Ops" }))
            .await
            .unwrap();
        let ticket_id = Uuid::new_v4();
        store
            .insert(
                &acme,
                "tickets",
                ticket_id,
                json!({ "id": ticket_id, "department_id": department_id, "stage_id": Uuid::new_v4() }),
            )
            .await
            .unwrap();

        let rows = store
            .aggregate(
                &acme,
                &Pipeline {
                    collection: "tickets",
                    filter: DocFilter::all().eq("department_id", department_id),
                    lookups: vec![
                        Lookup {
                            from: "departments",
                            local_field: "department_id",
                            as_field: "department",
                        },
                        Lookup {
                            from: "stages",
                            local_field: "stage_id",
                            as_field: "stage",
                        },
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["department"]["name"], "Ops");
        assert!(rows[0]["stage"].is_null());
    }
}
