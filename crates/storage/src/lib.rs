//! Local SQLite stand-in for the hosted backend.
//!
//! Implements the same row store, auth, file storage and insert feed traits as
//! the hosted client so the site runs offline and tests need no network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use backend::{BackendError, FileStorage, InsertSubscription, RealtimeFeed, RowQuery, TableStore};
use chrono::Utc;
use serde_json::Value;
use shared::domain::StoredObject;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{debug, warn};
use uuid::Uuid;

mod auth;
mod seed;
mod tables;

pub use auth::LocalAuthConfig;
pub use seed::default_projects;

use tables::{parse_timestamp, schema_for, timestamp};

const INSERT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct TableInsert {
    table: String,
    row: Value,
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    auth: LocalAuthConfig,
    inserts: broadcast::Sender<TableInsert>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if sqlite_path(database_url).is_none() {
            // The in-memory database lives only as long as its connection.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let (inserts, _) = broadcast::channel(INSERT_FEED_CAPACITY);
        Ok(Self {
            pool,
            auth: LocalAuthConfig::default(),
            inserts,
        })
    }

    pub fn with_auth(mut self, auth: LocalAuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Stores or replaces an object in a bucket.
    pub async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO stored_objects (bucket, name, content_type, bytes, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(bucket, name) DO UPDATE SET
                content_type = excluded.content_type,
                bytes = excluded.bytes,
                updated_at = excluded.updated_at",
        )
        .bind(bucket)
        .bind(name)
        .bind(content_type)
        .bind(bytes)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store object '{bucket}/{name}'"))?;
        Ok(())
    }
}

pub(crate) fn store_error(err: sqlx::Error) -> BackendError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return BackendError::Rejected {
                status: 409,
                message: format!("duplicate key value violates unique constraint: {db_err}"),
            };
        }
    }
    BackendError::Network(format!("local store failure: {err}"))
}

#[async_trait]
impl TableStore for Storage {
    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError> {
        let schema = schema_for(table)?;
        if let Some(token) = &query.bearer {
            self.verify_token(token).await?;
        }
        let (sql, binds) = schema.select_sql(query)?;
        let mut statement = sqlx::query(&sql);
        for value in binds {
            statement = statement.bind(value);
        }
        let rows = statement.fetch_all(&self.pool).await.map_err(store_error)?;
        rows.iter()
            .map(|row| schema.decode_row(row).map_err(store_error))
            .collect()
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let schema = schema_for(table)?;
        let id = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let created_at = row
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let values = schema.insert_values(&row, id.clone(), timestamp(created_at))?;
        let sql = schema.insert_sql();
        let mut statement = sqlx::query(&sql);
        for value in values {
            statement = statement.bind(value);
        }
        statement.execute(&self.pool).await.map_err(store_error)?;

        let stored = self
            .select_by_id(table, &id)
            .await?
            .ok_or_else(|| BackendError::Decode(format!("row {id} vanished from {table}")))?;
        debug!(%table, %id, "row inserted");
        // Nobody listening is fine.
        let _ = self.inserts.send(TableInsert {
            table: table.to_string(),
            row: stored.clone(),
        });
        Ok(stored)
    }
}

#[async_trait]
impl FileStorage for Storage {
    async fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        let rows = sqlx::query(
            "SELECT name, length(bytes), content_type, updated_at
             FROM stored_objects
             WHERE bucket = ?
             ORDER BY name ASC",
        )
        .bind(bucket)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows
            .into_iter()
            .map(|r| StoredObject {
                name: r.get::<String, _>(0),
                size: r.get::<Option<i64>, _>(1).map(|size| size.max(0) as u64),
                content_type: r.get::<Option<String>, _>(2),
                updated_at: parse_timestamp(&r.get::<String, _>(3)),
            })
            .collect())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let row = sqlx::query("SELECT bytes FROM stored_objects WHERE bucket = ? AND name = ?")
            .bind(bucket)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(|r| r.get::<Vec<u8>, _>(0))
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: "Object not found".to_string(),
            })
    }
}

#[async_trait]
impl RealtimeFeed for Storage {
    async fn subscribe_inserts(
        &self,
        table: &str,
        access_token: Option<&str>,
    ) -> Result<InsertSubscription, BackendError> {
        schema_for(table)?;
        if let Some(token) = access_token {
            self.verify_token(token).await?;
        }
        // Subscribe before returning so no insert after this call is missed.
        let mut inserts = self.inserts.subscribe();
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let wanted = table.to_string();

        let pump = tokio::spawn(async move {
            loop {
                match inserts.recv().await {
                    Ok(insert) if insert.table == wanted => {
                        if rows_tx.send(insert.row).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(table = %wanted, skipped, "insert feed subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(InsertSubscription::new(table, rows_rx, move || pump.abort()))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:")
        || database_url.contains("mode=memory")
        || !database_url.starts_with("sqlite:")
    {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
