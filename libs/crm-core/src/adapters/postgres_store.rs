use crate::store::{Condition, DocFilter, Pipeline};
use crate::{CoreError, CoreResult, DocumentStore, TenantId};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> CoreResult<()> {
    info!("Applying database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(CoreError::infrastructure)?;
    info!("Migrations applied successfully.");
    Ok(())
}

/// PostgreSQL implementation of the DocumentStore port. Every tenant and
/// collection shares the `documents` table; bodies are JSONB.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends ` AND <alias>.body->>'field' ...` for each condition. Field names
/// are bound like values.
fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, alias: &str, filter: &DocFilter) {
    for condition in filter.conditions() {
        match condition {
            Condition::Eq(field, value) => {
                builder.push(format!(" AND {alias}.body->>"));
                builder.push_bind(field.to_string());
                builder.push(" = ");
                builder.push_bind(value.clone());
            }
            Condition::In(field, values) => {
                builder.push(format!(" AND {alias}.body->>"));
                builder.push_bind(field.to_string());
                builder.push(" = ANY(");
                builder.push_bind(values.clone());
                builder.push(")");
            }
        }
    }
}

fn scoped<'a>(select: &str, ns: &TenantId, collection: &str) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(select);
    builder.push(" WHERE d.namespace = ");
    builder.push_bind(ns.as_str().to_string());
    builder.push(" AND d.collection = ");
    builder.push_bind(collection.to_string());
    builder
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO documents (namespace, collection, id, body) VALUES ($1, $2, $3, $4)
             ON CONFLICT (namespace, collection, id) DO NOTHING",
        )
        .bind(ns.as_str())
        .bind(collection)
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::AlreadyExists(format!("{collection} {id}")));
        }
        Ok(())
    }

    async fn get(&self, ns: &TenantId, collection: &str, id: Uuid) -> CoreResult<Option<Value>> {
        sqlx::query_scalar::<_, Value>(
            "SELECT body FROM documents WHERE namespace = $1 AND collection = $2 AND id = $3",
        )
        .bind(ns.as_str())
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::infrastructure)
    }

    async fn find(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<Vec<Value>> {
        let mut builder = scoped("SELECT d.body FROM documents d", ns, collection);
        push_conditions(&mut builder, "d", filter);
        builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::infrastructure)
    }

    async fn replace(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET body = $4, updated_at = NOW()
             WHERE namespace = $1 AND collection = $2 AND id = $3",
        )
        .bind(ns.as_str())
        .bind(collection)
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert(&self, ns: &TenantId, collection: &str, id: Uuid, doc: Value) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO documents (namespace, collection, id, body) VALUES ($1, $2, $3, $4)
             ON CONFLICT (namespace, collection, id)
             DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(ns.as_str())
        .bind(collection)
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        Ok(())
    }

    async fn delete(&self, ns: &TenantId, collection: &str, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE namespace = $1 AND collection = $2 AND id = $3",
        )
        .bind(ns.as_str())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(
        &self,
        ns: &TenantId,
        collection: &str,
        filter: &DocFilter,
    ) -> CoreResult<u64> {
        let mut builder = scoped("DELETE FROM documents d", ns, collection);
        push_conditions(&mut builder, "d", filter);
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(CoreError::infrastructure)?;
        Ok(result.rows_affected())
    }

    /// One statement: the match stage becomes the WHERE clause and each
    /// lookup a LEFT JOIN merged into the body.
    async fn aggregate(&self, ns: &TenantId, pipeline: &Pipeline) -> CoreResult<Vec<Value>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT d.body");
        if !pipeline.lookups.is_empty() {
            builder.push(" || jsonb_build_object(");
            for (index, lookup) in pipeline.lookups.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                builder.push_bind(lookup.as_field.to_string());
                builder.push(format!("::text, l{index}.body"));
            }
            builder.push(")");
        }
        builder.push(" FROM documents d");
        for (index, lookup) in pipeline.lookups.iter().enumerate() {
            builder.push(format!(
                " LEFT JOIN documents l{index} ON l{index}.namespace = d.namespace AND l{index}.collection = "
            ));
            builder.push_bind(lookup.from.to_string());
            builder.push(format!(" AND l{index}.id::text = d.body->>"));
            builder.push_bind(lookup.local_field.to_string());
        }
        builder.push(" WHERE d.namespace = ");
        builder.push_bind(ns.as_str().to_string());
        builder.push(" AND d.collection = ");
        builder.push_bind(pipeline.collection.to_string());
        push_conditions(&mut builder, "d", &pipeline.filter);

        builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::infrastructure)
    }

    async fn namespaces(&self, collection: &str) -> CoreResult<Vec<TenantId>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT namespace FROM documents WHERE collection = $1 ORDER BY namespace",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::infrastructure)?;

        Ok(names
            .into_iter()
            .filter_map(|name| match TenantId::parse(name.as_str()) {
                Ok(tenant) => Some(tenant),
                Err(e) => {
                    warn!(namespace = %name, error = %e, "Skipping namespace with invalid tenant id");
                    None
                }
            })
            .collect())
    }
}
