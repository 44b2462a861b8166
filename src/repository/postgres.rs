//! Postgres-backed object store.
//!
//! Two tables: `object_entities` holds one row per object, `object_values`
//! one row per attribute value, with child references stored as a JSONB
//! array of ids. Queries are runtime-checked sqlx; there is no compile-time
//! schema coupling because the data model is fixed while entity schemas are
//! not.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::config::config;
use crate::repository::{ObjectRecord, ObjectRepository, RepositoryError, ValueRecord};

pub struct PgObjectRepository {
    pool: PgPool,
}

impl PgObjectRepository {
    /// Connect using the process configuration. Fails when no DATABASE_URL
    /// is configured; this backend never guesses a connection string.
    pub async fn connect() -> Result<Self, RepositoryError> {
        let database = &config().database;
        let url = database.url.as_deref().ok_or_else(|| {
            RepositoryError::Configuration("DATABASE_URL is not configured".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .acquire_timeout(Duration::from_secs(database.connection_timeout_secs))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet. Idempotent, so
    /// startup can call it unconditionally.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS object_entities (
                id UUID PRIMARY KEY,
                entity TEXT NOT NULL,
                uri TEXT,
                external_id TEXT,
                organization TEXT,
                application UUID,
                has_errors BOOLEAN NOT NULL DEFAULT FALSE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS object_values (
                object_id UUID NOT NULL REFERENCES object_entities(id) ON DELETE CASCADE,
                attribute TEXT NOT NULL,
                position INT NOT NULL,
                scalar JSONB,
                children JSONB NOT NULL DEFAULT '[]'
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_object_entities_external
                ON object_entities (entity, external_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_object_values_object
                ON object_values (object_id)",
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!("object store schema ensured");
        Ok(())
    }

    async fn load_values(&self, id: Uuid) -> Result<Vec<ValueRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT attribute, scalar, children
             FROM object_values WHERE object_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(value_from_row).collect()
    }

    async fn hydrate(&self, row: &PgRow) -> Result<ObjectRecord, RepositoryError> {
        let mut record = record_from_row(row)?;
        record.values = self.load_values(record.id).await?;
        Ok(record)
    }
}

#[async_trait]
impl ObjectRepository for PgObjectRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ObjectRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, entity, uri, external_id, organization, application, has_errors
             FROM object_entities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_external_id(
        &self,
        entity: &str,
        external_id: &str,
    ) -> Result<Option<ObjectRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, entity, uri, external_id, organization, application, has_errors
             FROM object_entities WHERE entity = $1 AND external_id = $2",
        )
        .bind(entity)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, entity, uri, external_id, organization, application, has_errors
             FROM object_entities WHERE entity = $1",
        )
        .bind(entity)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn find_by_attribute(
        &self,
        entity: &str,
        attribute: &str,
        value: &Json,
    ) -> Result<Vec<ObjectRecord>, RepositoryError> {
        // Equality on the stored scalar, or containment when the stored
        // value is an array (multiple attributes)
        let rows = sqlx::query(
            "SELECT DISTINCT e.id, e.entity, e.uri, e.external_id, e.organization, e.application, e.has_errors
             FROM object_entities e
             JOIN object_values v ON v.object_id = e.id
             WHERE e.entity = $1 AND v.attribute = $2
               AND (v.scalar = $3 OR (jsonb_typeof(v.scalar) = 'array' AND v.scalar @> jsonb_build_array($3)))",
        )
        .bind(entity)
        .bind(attribute)
        .bind(value.clone())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn save_graph(&self, records: &[ObjectRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                "INSERT INTO object_entities (id, entity, uri, external_id, organization, application, has_errors)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO UPDATE SET
                    uri = EXCLUDED.uri,
                    external_id = EXCLUDED.external_id,
                    organization = EXCLUDED.organization,
                    application = EXCLUDED.application,
                    has_errors = EXCLUDED.has_errors",
            )
            .bind(record.id)
            .bind(&record.entity)
            .bind(&record.uri)
            .bind(&record.external_id)
            .bind(&record.organization)
            .bind(record.application)
            .bind(record.has_errors)
            .execute(&mut *tx)
            .await?;

            // Values are replaced wholesale; the record is the full state
            sqlx::query("DELETE FROM object_values WHERE object_id = $1")
                .bind(record.id)
                .execute(&mut *tx)
                .await?;

            for (position, value) in record.values.iter().enumerate() {
                let children = Json::Array(
                    value.children.iter().map(|c| Json::String(c.to_string())).collect(),
                );
                sqlx::query(
                    "INSERT INTO object_values (object_id, attribute, position, scalar, children)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(record.id)
                .bind(&value.attribute)
                .bind(position as i32)
                .bind(value.scalar.clone())
                .bind(children)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        uri: Option<&str>,
        external_id: Option<&str>,
        has_errors: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE object_entities SET uri = $2, external_id = $3, has_errors = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(uri)
        .bind(external_id)
        .bind(has_errors)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), RepositoryError> {
        // Values go with the object via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM object_entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<ObjectRecord, RepositoryError> {
    Ok(ObjectRecord {
        id: row.try_get("id")?,
        entity: row.try_get("entity")?,
        uri: row.try_get("uri")?,
        external_id: row.try_get("external_id")?,
        organization: row.try_get("organization")?,
        application: row.try_get("application")?,
        has_errors: row.try_get("has_errors")?,
        values: Vec::new(),
    })
}

fn value_from_row(row: &PgRow) -> Result<ValueRecord, RepositoryError> {
    let children: Json = row.try_get("children")?;
    let children = match children {
        Json::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .collect(),
        _ => Vec::new(),
    };
    Ok(ValueRecord {
        attribute: row.try_get("attribute")?,
        scalar: row.try_get("scalar")?,
        children,
    })
}
