//! Document store contract and the SQLite-backed implementation.
//!
//! Documents are schemaless JSON objects addressed by `(collection, id)`.
//! Queries support a single equality or array-contains filter and ordering by
//! one top-level field, which is all the repositories need. Filtering and
//! ordering run inside SQLite through its JSON functions.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// Default SQLite busy timeout in milliseconds when the DB is under load.
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

pub type DocumentBody = Map<String, Value>;

/// A stored document together with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: DocumentBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

/// Query over one collection: at most one filter, at most one ordering field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_equal(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter::Equal {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filter = Some(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }
}

/// Contract of the document database used by the repositories.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Inserts a document under a freshly generated id and returns that id.
    async fn add(&self, collection: &str, body: DocumentBody) -> Result<String, StoreError>;

    /// Writes the document at `id`, replacing any previous body.
    async fn set(&self, collection: &str, id: &str, body: DocumentBody) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Removes the document. Returns whether a document was present.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

/// SQLite implementation of [`DocumentStore`].
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the SQLite database at `database_url`, e.g.
    /// `sqlite://./.devhub/devhub.db` or `sqlite::memory:`, and runs the
    /// embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        // Every in-memory connection is a separate database, so the pool must
        // hold exactly one connection and never recycle it.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn add(&self, collection: &str, body: DocumentBody) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let encoded = encode_body(collection, &body)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(encoded)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(collection, id = %id, "document added");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, body: DocumentBody) -> Result<(), StoreError> {
        let encoded = encode_body(collection, &body)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (collection, id)
            DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(encoded)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(collection, id, "document set");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT id, body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| map_document(collection, row)).transpose()
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
        let mut binds = vec![collection.to_string()];

        match &query.filter {
            Some(Filter::Equal { field, value }) => {
                sql.push_str(" AND json_extract(body, ?) = json_extract(?, '$')");
                binds.push(json_path(field)?);
                binds.push(value.to_string());
            }
            Some(Filter::ArrayContains { field, value }) => {
                sql.push_str(
                    " AND EXISTS (SELECT 1 FROM json_each(body, ?) \
                     WHERE json_each.value = json_extract(?, '$'))",
                );
                binds.push(json_path(field)?);
                binds.push(value.to_string());
            }
            None => {}
        }

        match &query.order_by {
            Some((field, direction)) => {
                sql.push_str(&format!(
                    " ORDER BY json_extract(body, ?) {}, id ASC",
                    direction.as_sql()
                ));
                binds.push(json_path(field)?);
            }
            None => sql.push_str(" ORDER BY id ASC"),
        }

        let mut statement = sqlx::query(&sql);
        for value in &binds {
            statement = statement.bind(value.as_str());
        }

        let mut rows = statement.fetch(&self.pool);
        let mut out = Vec::new();
        while let Some(row) = rows.try_next().await? {
            out.push(map_document(collection, row)?);
        }
        Ok(out)
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Builds the SQLite JSON path for a top-level field. Field names come from
/// code, but are still restricted to identifier characters.
fn json_path(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("$.{field}"))
}

fn encode_body(collection: &str, body: &DocumentBody) -> Result<String, StoreError> {
    serde_json::to_string(body).map_err(|source| StoreError::Encode {
        collection: collection.to_string(),
        source,
    })
}

fn map_document(collection: &str, row: SqliteRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id")?;
    let raw: String = row.try_get("body")?;
    let body = serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
        collection: collection.to_string(),
        id: id.clone(),
        source,
    })?;
    Ok(Document { id, body })
}
