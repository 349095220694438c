//! In-memory backend double that records calls and can be told to fail.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use backend::{
    AuthProvider, BackendError, FileStorage, InsertSubscription, RealtimeFeed, RowQuery,
    TableStore,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shared::domain::{Session, StoredObject, UserId, CONTACT_TABLE};
use tokio::sync::mpsc;

pub(crate) const ADMIN_EMAIL: &str = "admin@example.com";
pub(crate) const ADMIN_PASSWORD: &str = "correct-horse";
pub(crate) const EXPIRED_EMAIL: &str = "expired@example.com";

#[derive(Default)]
pub(crate) struct FakeBackend {
    rows: Mutex<HashMap<String, Vec<Value>>>,
    objects: Mutex<Vec<(StoredObject, Vec<u8>)>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
    /// Rows pushed to the live feed while a contact snapshot is being read.
    during_snapshot: Mutex<Vec<Value>>,
    pub(crate) selects: AtomicUsize,
    pub(crate) inserts: AtomicUsize,
    pub(crate) sign_in_calls: AtomicUsize,
    pub(crate) sign_out_calls: AtomicUsize,
    pub(crate) released: Arc<AtomicUsize>,
    pub(crate) offline: AtomicBool,
    pub(crate) fail_sign_out: AtomicBool,
    pub(crate) fail_subscribe: AtomicBool,
    /// Bearer of every select, `None` for anonymous reads.
    pub(crate) select_bearers: Mutex<Vec<Option<String>>>,
    pub(crate) feed_tokens: Mutex<Vec<Option<String>>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_rows(table: &str, rows: Vec<Value>) -> Arc<Self> {
        let backend = Self::default();
        backend
            .rows
            .lock()
            .expect("rows lock")
            .insert(table.to_string(), rows);
        Arc::new(backend)
    }

    pub(crate) fn put_object(&self, name: &str, updated_at: &str, content_type: Option<&str>, bytes: &[u8]) {
        self.objects.lock().expect("objects lock").push((
            StoredObject {
                name: name.to_string(),
                size: Some(bytes.len() as u64),
                content_type: content_type.map(str::to_string),
                updated_at: updated_at.parse().ok(),
            },
            bytes.to_vec(),
        ));
    }

    pub(crate) fn push_during_snapshot(&self, row: Value) {
        self.during_snapshot.lock().expect("race lock").push(row);
    }

    /// Delivers a row to every open subscription without storing it.
    pub(crate) fn emit(&self, row: Value) {
        self.feeds
            .lock()
            .expect("feeds lock")
            .retain(|feed| feed.send(row.clone()).is_ok());
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Value> {
        self.rows
            .lock()
            .expect("rows lock")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

pub(crate) fn message_row(id: u64, name: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "message": "Hello, I enjoyed your portfolio",
        "created_at": created_at,
    })
}

#[async_trait]
impl TableStore for FakeBackend {
    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.select_bearers
            .lock()
            .expect("bearers lock")
            .push(query.bearer.clone());
        self.ensure_online()?;

        if table == CONTACT_TABLE {
            let racing: Vec<Value> = self.during_snapshot.lock().expect("race lock").drain(..).collect();
            for row in racing {
                self.emit(row);
            }
        }

        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| {
                query.filters.iter().all(|(column, value)| match &row[column.as_str()] {
                    Value::String(text) => text == value,
                    other => other.to_string() == *value,
                })
            })
            .collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Value, BackendError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let mut rows = self.rows.lock().expect("rows lock");
        let table_rows = rows.entry(table.to_string()).or_default();
        row["id"] = json!(table_rows.len() + 100);
        row["created_at"] = json!(Utc::now().to_rfc3339());
        table_rows.push(row.clone());
        drop(rows);
        if table == CONTACT_TABLE {
            self.emit(row.clone());
        }
        Ok(row)
    }
}

#[async_trait]
impl AuthProvider for FakeBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let expires_at = match (email, password) {
            (ADMIN_EMAIL, ADMIN_PASSWORD) => Utc::now() + Duration::hours(1),
            (EXPIRED_EMAIL, ADMIN_PASSWORD) => Utc::now() - Duration::minutes(1),
            _ => {
                return Err(BackendError::Unauthorized(
                    "Invalid login credentials".to_string(),
                ))
            }
        };
        Ok(Session {
            user_id: UserId::from("admin-1"),
            email: email.to_string(),
            access_token: format!("token-for-{email}"),
            expires_at,
        })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BackendError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for FakeBackend {
    async fn list(&self, _bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        self.ensure_online()?;
        Ok(self
            .objects
            .lock()
            .expect("objects lock")
            .iter()
            .map(|(object, _)| object.clone())
            .collect())
    }

    async fn download(&self, _bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        self.ensure_online()?;
        self.objects
            .lock()
            .expect("objects lock")
            .iter()
            .find(|(object, _)| object.name == path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: "Object not found".to_string(),
            })
    }
}

#[async_trait]
impl RealtimeFeed for FakeBackend {
    async fn subscribe_inserts(
        &self,
        table: &str,
        access_token: Option<&str>,
    ) -> Result<InsertSubscription, BackendError> {
        self.feed_tokens
            .lock()
            .expect("tokens lock")
            .push(access_token.map(str::to_string));
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::Network("realtime connect failed".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().expect("feeds lock").push(tx);
        let released = self.released.clone();
        Ok(InsertSubscription::new(table, rx, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
