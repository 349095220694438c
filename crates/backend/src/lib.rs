//! The managed backend as this site consumes it: a row store, password auth,
//! file storage and a feed of table inserts.
//!
//! [`SupabaseBackend`] talks to a hosted Supabase-compatible project. The
//! `storage` crate provides a local SQLite implementation of the same traits.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use shared::domain::{Session, StoredObject};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod realtime;
pub mod supabase;

pub use realtime::RealtimeHub;
pub use supabase::{SupabaseBackend, SupabaseConfig};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Network(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected backend payload: {0}")]
    Decode(String),
    #[error("subscription closed")]
    Closed,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Equality filters, a single ordering column and an optional row cap.
///
/// `bearer` is the signed-in user's access token. Reads without one run with
/// anonymous rights.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, SortOrder)>,
    pub limit: Option<u32>,
    pub bearer: Option<String>,
}

impl fmt::Debug for RowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowQuery")
            .field("filters", &self.filters)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn bearer(mut self, access_token: impl Into<String>) -> Self {
        self.bearer = Some(access_token.into());
        self
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError>;

    async fn select_by_id(&self, table: &str, id: &str) -> Result<Option<Value>, BackendError> {
        let rows = self
            .select(table, &RowQuery::new().eq("id", id).limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts one row and returns it as stored, server-assigned columns included.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError>;
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError>;
}

#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    /// Resolves once the feed is live: rows inserted after this returns are
    /// delivered. `access_token` scopes the feed to a signed-in user.
    async fn subscribe_inserts(
        &self,
        table: &str,
        access_token: Option<&str>,
    ) -> Result<InsertSubscription, BackendError>;
}

pub trait Backend: TableStore + AuthProvider + FileStorage + RealtimeFeed {}

impl<T> Backend for T where T: TableStore + AuthProvider + FileStorage + RealtimeFeed {}

/// Live stream of rows inserted into one table.
///
/// Dropping the subscription releases it on the backend side.
pub struct InsertSubscription {
    table: String,
    rows: mpsc::UnboundedReceiver<Value>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl InsertSubscription {
    pub fn new(
        table: impl Into<String>,
        rows: mpsc::UnboundedReceiver<Value>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            rows,
            release: Some(Box::new(release)),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Next inserted row, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Value> {
        self.rows.recv().await
    }

    pub fn try_next(&mut self) -> Option<Value> {
        self.rows.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for InsertSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
