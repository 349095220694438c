use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{Session, StoredObject, UserId};
use tracing::debug;
use url::Url;

use crate::{
    realtime::RealtimeHub, AuthProvider, BackendError, FileStorage, InsertSubscription,
    RealtimeFeed, RowQuery, SortOrder, TableStore,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const STORAGE_LIST_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, BackendError> {
        let mut url = Url::parse(url.trim())
            .map_err(|err| BackendError::Decode(format!("invalid backend url '{url}': {err}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            url,
            anon_key: anon_key.into(),
        })
    }
}

/// Client for a hosted Supabase-compatible project.
#[derive(Clone)]
pub struct SupabaseBackend {
    http: Client,
    config: SupabaseConfig,
    realtime: RealtimeHub,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListObjectsRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    #[serde(rename = "sortBy")]
    sort_by: ListSort<'a>,
}

#[derive(Debug, Serialize)]
struct ListSort<'a> {
    column: &'a str,
    order: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mimetype: Option<String>,
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| BackendError::Network(format!("failed to build http client: {err}")))?;
        let realtime = RealtimeHub::new(&config.url, &config.anon_key)?;
        Ok(Self {
            http,
            config,
            realtime,
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.config
            .url
            .join(path)
            .map_err(|err| BackendError::Decode(format!("invalid endpoint '{path}': {err}")))
    }

    fn authorized(&self, builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.config.anon_key))
    }

    fn rows_url(&self, table: &str, query: &RowQuery) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in &query.filters {
                pairs.append_pair(column, &format!("eq.{value}"));
            }
            if let Some((column, order)) = &query.order {
                let direction = match order {
                    SortOrder::Ascending => "asc",
                    SortOrder::Descending => "desc",
                };
                pairs.append_pair("order", &format!("{column}.{direction}"));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }
}

/// Turns a non-2xx response into a typed error, keeping the backend's message.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(BackendError::Unauthorized(message))
    } else {
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl TableStore for SupabaseBackend {
    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError> {
        let url = self.rows_url(table, query)?;
        debug!(%table, signed_in = query.bearer.is_some(), "rest select");
        let response = self
            .authorized(self.http.get(url), query.bearer.as_deref())
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        debug!(%table, "rest insert");
        let response = self
            .authorized(self.http.post(url), None)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {table} returned no row")))
    }
}

#[async_trait]
impl AuthProvider for SupabaseBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .authorized(self.http.post(url), None)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        // The auth service answers bad credentials with 400 invalid_grant.
        let response = match check(response).await {
            Err(BackendError::Rejected { status, message }) if (400..500).contains(&status) => {
                return Err(BackendError::Unauthorized(message))
            }
            other => other?,
        };
        let token: TokenResponse = response.json().await?;

        let expires_at = token
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                token
                    .expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            })
            .ok_or_else(|| BackendError::Decode("token response has no lifetime".to_string()))?;

        Ok(Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
            expires_at,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let url = self.endpoint("auth/v1/logout")?;
        let response = self
            .authorized(self.http.post(url), Some(access_token))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl FileStorage for SupabaseBackend {
    async fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        let url = self.endpoint(&format!("storage/v1/object/list/{bucket}"))?;
        let response = self
            .authorized(self.http.post(url), None)
            .json(&ListObjectsRequest {
                prefix: "",
                limit: STORAGE_LIST_LIMIT,
                offset: 0,
                sort_by: ListSort {
                    column: "name",
                    order: "asc",
                },
            })
            .send()
            .await?;
        let listed: Vec<ListedObject> = check(response).await?.json().await?;

        // Folder placeholders come back without an id.
        Ok(listed
            .into_iter()
            .filter(|object| object.id.as_ref().is_some_and(|id| !id.is_null()))
            .map(|object| {
                let (size, content_type) = object
                    .metadata
                    .map(|meta| (meta.size, meta.mimetype))
                    .unwrap_or_default();
                StoredObject {
                    name: object.name,
                    size,
                    content_type,
                    updated_at: object.updated_at,
                }
            })
            .collect())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let mut url = self.endpoint("storage/v1/object/")?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Decode("backend url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        let response = self
            .authorized(self.http.get(url), None)
            .send()
            .await?;
        let bytes = check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RealtimeFeed for SupabaseBackend {
    async fn subscribe_inserts(
        &self,
        table: &str,
        access_token: Option<&str>,
    ) -> Result<InsertSubscription, BackendError> {
        self.realtime.subscribe(table, access_token).await
    }
}

#[cfg(test)]
#[path = "tests/supabase_tests.rs"]
mod tests;
