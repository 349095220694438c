use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct MockState {
    queries: Arc<Mutex<Vec<String>>>,
    bearers: Arc<Mutex<Vec<String>>>,
    inserted: Arc<Mutex<Vec<Value>>>,
}

async fn handle_select(
    State(state): State<MockState>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no api key" })));
    }
    state
        .queries
        .lock()
        .await
        .push(format!("{table}?{}", query.unwrap_or_default()));
    if let Some(bearer) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.bearers.lock().await.push(bearer.to_string());
    }
    (
        StatusCode::OK,
        Json(json!([
            { "id": 2, "name": "Bea", "email": "bea@example.com", "message": "second message", "created_at": "2024-05-02T10:00:00+00:00" },
            { "id": 1, "name": "Ada", "email": "ada@example.com", "message": "first message!", "created_at": "2024-05-01T10:00:00+00:00" }
        ])),
    )
}

async fn handle_insert(
    State(state): State<MockState>,
    Path(_table): Path<String>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> impl IntoResponse {
    assert_eq!(
        headers.get("prefer").and_then(|v| v.to_str().ok()),
        Some("return=representation")
    );
    let mut row = rows.into_iter().next().expect("one row");
    state.inserted.lock().await.push(row.clone());
    row["id"] = json!("3f1c");
    row["created_at"] = json!("2024-05-03T10:00:00+00:00");
    (StatusCode::CREATED, Json(json!([row])))
}

async fn handle_token(RawQuery(query): RawQuery, Json(grant): Json<Value>) -> impl IntoResponse {
    assert_eq!(query.as_deref(), Some("grant_type=password"));
    if grant["password"] == "correct-horse" {
        (
            StatusCode::OK,
            Json(json!({
                "access_token": "token-abc",
                "token_type": "bearer",
                "expires_in": 3600,
                "expires_at": 1_900_000_000,
                "refresh_token": "refresh",
                "user": { "id": "user-1", "email": "admin@example.com" }
            })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })),
        )
    }
}

async fn handle_logout(headers: HeaderMap) -> StatusCode {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer token-abc") => StatusCode::NO_CONTENT,
        _ => StatusCode::UNAUTHORIZED,
    }
}

async fn handle_list(Path(bucket): Path<String>) -> Json<Value> {
    assert_eq!(bucket, "resume");
    Json(json!([
        { "name": "archive", "id": null, "updated_at": null, "metadata": null },
        {
            "name": "cv.pdf",
            "id": "obj-1",
            "updated_at": "2024-04-01T00:00:00Z",
            "metadata": { "size": 4, "mimetype": "application/pdf" }
        }
    ]))
}

async fn handle_download(Path((bucket, path)): Path<(String, String)>) -> impl IntoResponse {
    if bucket == "resume" && path == "cv.pdf" {
        (StatusCode::OK, b"%PDF".to_vec())
    } else {
        (StatusCode::NOT_FOUND, b"missing".to_vec())
    }
}

async fn spawn_backend() -> (SupabaseBackend, MockState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MockState::default();
    let app = Router::new()
        .route("/rest/v1/:table", get(handle_select).post(handle_insert))
        .route("/auth/v1/token", post(handle_token))
        .route("/auth/v1/logout", post(handle_logout))
        .route("/storage/v1/object/list/:bucket", post(handle_list))
        .route("/storage/v1/object/:bucket/*path", get(handle_download))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = SupabaseConfig::new(&format!("http://{addr}"), "anon-key").expect("config");
    (SupabaseBackend::new(config).expect("backend"), state)
}

#[test]
fn config_normalizes_trailing_slash() {
    let config = SupabaseConfig::new("https://demo.supabase.co", "k").expect("config");
    assert_eq!(config.url.as_str(), "https://demo.supabase.co/");
    let nested = SupabaseConfig::new("https://proxy.local/supabase", "k").expect("config");
    assert_eq!(nested.url.as_str(), "https://proxy.local/supabase/");
}

#[tokio::test]
async fn select_encodes_filters_order_and_limit() {
    let (backend, state) = spawn_backend().await;
    let rows = backend
        .select(
            "contact_submissions",
            &RowQuery::new()
                .eq("email", "ada@example.com")
                .order_by("created_at", SortOrder::Descending)
                .limit(5),
        )
        .await
        .expect("select");
    assert_eq!(rows.len(), 2);

    let queries = state.queries.lock().await;
    assert_eq!(
        queries[0],
        "contact_submissions?select=*&email=eq.ada%40example.com&order=created_at.desc&limit=5"
    );
}

#[tokio::test]
async fn select_runs_with_user_token_when_given() {
    let (backend, state) = spawn_backend().await;
    backend
        .select("contact_submissions", &RowQuery::new())
        .await
        .expect("anonymous select");
    backend
        .select("contact_submissions", &RowQuery::new().bearer("admin-jwt"))
        .await
        .expect("signed-in select");

    assert_eq!(
        *state.bearers.lock().await,
        vec!["anon-key".to_string(), "admin-jwt".to_string()]
    );
}

#[tokio::test]
async fn select_by_id_takes_first_row() {
    let (backend, state) = spawn_backend().await;
    let row = backend
        .select_by_id("projects", "2")
        .await
        .expect("select")
        .expect("row");
    assert_eq!(row["id"], 2);
    assert_eq!(
        state.queries.lock().await[0],
        "projects?select=*&id=eq.2&limit=1"
    );
}

#[tokio::test]
async fn insert_returns_server_representation() {
    let (backend, state) = spawn_backend().await;
    let stored = backend
        .insert(
            "contact_submissions",
            json!({ "name": "Ada", "email": "ada@example.com", "message": "hello there!" }),
        )
        .await
        .expect("insert");
    assert_eq!(stored["id"], "3f1c");
    assert_eq!(state.inserted.lock().await.len(), 1);
}

#[tokio::test]
async fn sign_in_maps_token_response_to_session() {
    let (backend, _state) = spawn_backend().await;
    let session = backend
        .sign_in_with_password("admin@example.com", "correct-horse")
        .await
        .expect("sign in");
    assert_eq!(session.user_id, UserId::from("user-1"));
    assert_eq!(session.access_token, "token-abc");
    assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
}

#[tokio::test]
async fn sign_in_with_bad_password_is_unauthorized() {
    let (backend, _state) = spawn_backend().await;
    let err = backend
        .sign_in_with_password("admin@example.com", "wrong-password")
        .await
        .expect_err("must fail");
    match err {
        BackendError::Unauthorized(message) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn sign_out_sends_access_token() {
    let (backend, _state) = spawn_backend().await;
    backend.sign_out("token-abc").await.expect("sign out");
    let err = backend.sign_out("stale").await.expect_err("stale token");
    assert!(matches!(err, BackendError::Unauthorized(_)));
}

#[tokio::test]
async fn storage_list_skips_folders_and_download_returns_bytes() {
    let (backend, _state) = spawn_backend().await;
    let objects = backend.list("resume").await.expect("list");
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].name, "cv.pdf");
    assert_eq!(objects[0].content_type.as_deref(), Some("application/pdf"));

    let bytes = backend.download("resume", "cv.pdf").await.expect("download");
    assert_eq!(bytes, b"%PDF");

    let err = backend
        .download("resume", "missing.pdf")
        .await
        .expect_err("missing");
    assert!(matches!(err, BackendError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = SupabaseConfig::new(&format!("http://{addr}"), "anon-key").expect("config");
    let backend = SupabaseBackend::new(config).expect("backend");
    let err = backend
        .select("projects", &RowQuery::new())
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, BackendError::Network(_)));
}
