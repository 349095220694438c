//! JSON endpoints under `/api`, for scripts and tooling that would rather not
//! scrape the pages.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    domain::{ContactMessage, Project},
    error::{ApiError, ErrorCode, SiteError},
    protocol::{LoginRequest, Notice, SessionView},
    validation::{ContactForm, NewsletterForm},
};
use site_core::Category;

use crate::{
    app_state::AppState,
    sessions::{self, AdminApi, Visitor},
};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/contact", post(submit_contact))
        .route("/newsletter", post(subscribe))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/session", get(current_session))
        .route("/messages", get(list_messages))
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unavailable => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn site_status(err: &SiteError) -> StatusCode {
    match err {
        SiteError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SiteError::Auth(_) => StatusCode::UNAUTHORIZED,
        SiteError::Network(_) => StatusCode::BAD_GATEWAY,
    }
}

fn reject(err: SiteError) -> (StatusCode, Json<ApiError>) {
    let body = ApiError::from(err);
    (status_for(body.code), Json(body))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryQuery {
    pub(crate) category: Option<String>,
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Json<Vec<Project>> {
    let category = query
        .category
        .as_deref()
        .map(Category::parse)
        .unwrap_or_default();
    Json(state.site.catalog().list_in(category).await)
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    state.site.catalog().get(&id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "project not found")),
        )
    })
}

async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(form): Json<ContactForm>,
) -> ApiResult<Json<Notice>> {
    state
        .site
        .contact_form()
        .submit(&form)
        .await
        .map(Json)
        .map_err(reject)
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(form): Json<NewsletterForm>,
) -> ApiResult<Json<Notice>> {
    state
        .site
        .newsletter()
        .subscribe(&form)
        .await
        .map(Json)
        .map_err(reject)
}

async fn login(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Json(request): Json<LoginRequest>,
) -> Response {
    match sessions::sign_in(
        &state,
        visitor.session_id.as_deref(),
        &request.email,
        &request.password,
    )
    .await
    {
        Ok((sid, session)) => (
            [(
                header::SET_COOKIE,
                sessions::session_cookie(&sid, &session, state.cookie_secure),
            )],
            Json(SessionView::from(&session)),
        )
            .into_response(),
        Err(err) => reject(err).into_response(),
    }
}

async fn logout(State(state): State<Arc<AppState>>, visitor: Visitor) -> Response {
    let cleared = [(header::SET_COOKIE, sessions::clear_cookie(state.cookie_secure))];
    match sessions::sign_out(&state, visitor.session_id.as_deref()).await {
        Ok(()) => (cleared, StatusCode::NO_CONTENT).into_response(),
        Err(err) => (cleared, reject(err)).into_response(),
    }
}

async fn current_session(visitor: Visitor) -> Json<Option<SessionView>> {
    Json(visitor.session.as_ref().map(SessionView::from))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    AdminApi(session): AdminApi,
) -> Json<Vec<ContactMessage>> {
    let controller = state.site.open_messages(&session);
    Json(controller.ready().await.items().to_vec())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
