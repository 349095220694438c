use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    routing::{get, post},
    Form, Router,
};
use futures::{stream, stream::BoxStream, StreamExt};
use serde::Deserialize;
use shared::{
    error::{ApiError, SiteError},
    protocol::{LiveEvent, LoginRequest, Notice},
    validation::{ContactForm, NewsletterForm},
};
use site_core::{guard, Category};
use tracing::{debug, warn};

use crate::{
    api::{site_status, CategoryQuery},
    app_state::AppState,
    live::{LiveFeed, Update, Watermark},
    sessions::{self, AdminApi, AdminPage, Visitor},
};

pub(crate) mod render;

use render::Chrome;

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route("/about", get(about))
        .route("/contact", get(contact).post(submit_contact))
        .route("/project/:id", get(project))
        .route("/newsletter", post(subscribe))
        .route(guard::LOGIN_PATH, get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/resume", get(resume))
        .route(guard::DEFAULT_AFTER_LOGIN, get(admin_messages))
        .route(MESSAGE_STREAM_PATH, get(message_stream))
}

fn html(
    state: &AppState,
    signed_in: bool,
    path: &str,
    notice: Option<&Notice>,
    title: &str,
    body: &str,
) -> Html<String> {
    let chrome = Chrome {
        owner: &state.owner,
        path,
        signed_in,
        notice,
    };
    Html(render::page(&chrome, title, body))
}

fn failure_notice(err: &SiteError) -> Notice {
    Notice::error("Error", err.to_string())
}

async fn home(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Query(query): Query<CategoryQuery>,
) -> Html<String> {
    let category = query
        .category
        .as_deref()
        .map(Category::parse)
        .unwrap_or_default();
    let projects = state.site.catalog().list_in(category).await;
    html(
        &state,
        visitor.session.is_some(),
        "/",
        None,
        "Projects",
        &render::home(&state.owner, &projects, category),
    )
}

async fn about(State(state): State<Arc<AppState>>, visitor: Visitor) -> Html<String> {
    html(
        &state,
        visitor.session.is_some(),
        "/about",
        None,
        "About",
        &render::about(&state.owner),
    )
}

async fn project(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Path(id): Path<String>,
) -> Response {
    let signed_in = visitor.session.is_some();
    let path = format!("/project/{id}");
    match state.site.catalog().get(&id).await {
        Some(project) => html(
            &state,
            signed_in,
            &path,
            None,
            &project.title,
            &render::project_detail(&project),
        )
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            html(
                &state,
                signed_in,
                &path,
                None,
                "Project not found",
                &render::project_not_found(),
            ),
        )
            .into_response(),
    }
}

async fn contact(State(state): State<Arc<AppState>>, visitor: Visitor) -> Html<String> {
    html(
        &state,
        visitor.session.is_some(),
        "/contact",
        None,
        "Contact",
        &render::contact(&state.owner, &ContactForm::default(), None),
    )
}

async fn submit_contact(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Form(form): Form<ContactForm>,
) -> Response {
    let signed_in = visitor.session.is_some();
    match state.site.contact_form().submit(&form).await {
        Ok(notice) => html(
            &state,
            signed_in,
            "/contact",
            Some(&notice),
            "Contact",
            &render::contact(&state.owner, &ContactForm::default(), None),
        )
        .into_response(),
        Err(SiteError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            html(
                &state,
                signed_in,
                "/contact",
                None,
                "Contact",
                &render::contact(&state.owner, &form, Some(&errors)),
            ),
        )
            .into_response(),
        Err(err) => (
            site_status(&err),
            html(
                &state,
                signed_in,
                "/contact",
                Some(&failure_notice(&err)),
                "Contact",
                &render::contact(&state.owner, &form, None),
            ),
        )
            .into_response(),
    }
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Form(form): Form<NewsletterForm>,
) -> Response {
    let (status, notice) = match state.site.newsletter().subscribe(&form).await {
        Ok(notice) => (StatusCode::OK, notice),
        Err(SiteError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Notice::error(
                "Error",
                errors.for_field("email").unwrap_or("Invalid email address"),
            ),
        ),
        Err(err) => (site_status(&err), failure_notice(&err)),
    };
    (
        status,
        html(
            &state,
            visitor.session.is_some(),
            "/newsletter",
            Some(&notice),
            "Newsletter",
            &render::notice_only("/", "Back to Projects"),
        ),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Query(query): Query<LoginQuery>,
) -> Response {
    if visitor.session.is_some() {
        return Redirect::to(&guard::post_login_destination(query.next.as_deref())).into_response();
    }

    let notice = state
        .site
        .check_backend()
        .await
        .err()
        .map(|err| Notice::error("Connection Error", err.to_string()));
    html(
        &state,
        false,
        guard::LOGIN_PATH,
        notice.as_ref(),
        "Admin Login",
        &render::login(query.next.as_deref(), "", None),
    )
    .into_response()
}

async fn login(
    State(state): State<Arc<AppState>>,
    visitor: Visitor,
    Form(request): Form<LoginRequest>,
) -> Response {
    let next = request.next.as_deref().filter(|next| !next.is_empty());
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
            Redirect::to(&guard::post_login_destination(next)),
        )
            .into_response(),
        Err(SiteError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            html(
                &state,
                false,
                guard::LOGIN_PATH,
                None,
                "Admin Login",
                &render::login(next, &request.email, Some(&errors)),
            ),
        )
            .into_response(),
        Err(err) => (
            site_status(&err),
            html(
                &state,
                false,
                guard::LOGIN_PATH,
                Some(&failure_notice(&err)),
                "Admin Login",
                &render::login(next, &request.email, None),
            ),
        )
            .into_response(),
    }
}

async fn logout(State(state): State<Arc<AppState>>, visitor: Visitor) -> Response {
    if let Err(err) = sessions::sign_out(&state, visitor.session_id.as_deref()).await {
        warn!(error = %err, "sign-out finished with a backend error");
    }
    (
        [(header::SET_COOKIE, sessions::clear_cookie(state.cookie_secure))],
        Redirect::to("/"),
    )
        .into_response()
}

/// Keeps a stored name safe to quote in `Content-Disposition`.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | ' '))
        .collect();
    if cleaned.trim().is_empty() {
        "resume.pdf".to_string()
    } else {
        cleaned
    }
}

async fn resume(State(state): State<Arc<AppState>>, visitor: Visitor) -> Response {
    let signed_in = visitor.session.is_some();
    match state.site.latest_resume().await {
        Ok(Some(file)) => (
            [
                (header::CONTENT_TYPE, file.content_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", attachment_name(&file.name)),
                ),
            ],
            file.bytes,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            html(
                &state,
                signed_in,
                "/resume",
                Some(&Notice::info(
                    "Resume unavailable",
                    "No resume has been uploaded yet.",
                )),
                "Resume",
                &render::notice_only("/", "Back to Projects"),
            ),
        )
            .into_response(),
        Err(err) => (
            site_status(&err),
            html(
                &state,
                signed_in,
                "/resume",
                Some(&failure_notice(&err)),
                "Resume",
                &render::notice_only("/", "Back to Projects"),
            ),
        )
            .into_response(),
    }
}

async fn admin_messages(
    State(state): State<Arc<AppState>>,
    AdminPage(session): AdminPage,
) -> Html<String> {
    debug!(email = %session.email, "rendering contact messages");
    let controller = state.site.open_messages(&session);
    let list = controller.ready().await;
    let stream_url = stream_url(&Watermark::covering(list.items()));
    html(
        &state,
        true,
        guard::DEFAULT_AFTER_LOGIN,
        None,
        "Contact Messages",
        &render::admin_messages(list.items(), &stream_url),
    )
}

/// The live stream picks up right after what the page rendered.
fn stream_url(mark: &Watermark) -> String {
    let after: String = url::form_urlencoded::byte_serialize(mark.encode().as_bytes()).collect();
    format!("{MESSAGE_STREAM_PATH}?after={after}")
}

const MESSAGE_STREAM_PATH: &str = "/admin/messages/stream";
const LAST_EVENT_ID: &str = "last-event-id";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamQuery {
    after: Option<String>,
}

/// Where the browser's view ends. A reconnecting `EventSource` reports its
/// last event id, which wins over the position the page was rendered with.
fn resume_point(headers: &HeaderMap, query: &StreamQuery) -> Option<Watermark> {
    let raw = headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .or(query.after.as_deref())?;
    let mark = Watermark::parse(raw);
    if mark.is_none() {
        debug!(%raw, "ignoring unreadable stream position");
    }
    mark
}

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;

fn sse_event(event: LiveEvent) -> Result<Event, axum::Error> {
    let name = match &event {
        LiveEvent::MessageInserted { .. } => "inserted",
        LiveEvent::Error(_) => "failure",
    };
    Event::default().event(name).json_data(event)
}

fn live_update(update: Update) -> Result<Event, axum::Error> {
    let event = sse_event(update.event)?;
    let id = update.resume.encode();
    // SSE ids are a single line.
    if id.is_empty() || id.contains(['\n', '\r', '\0']) {
        return Ok(event);
    }
    Ok(event.id(id))
}

async fn message_stream(
    State(state): State<Arc<AppState>>,
    AdminApi(session): AdminApi,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Sse<EventStream> {
    let events: EventStream = match state.site.check_backend().await {
        Ok(()) => {
            let resume = resume_point(&headers, &query);
            debug!(
                email = %session.email,
                resumed = resume.is_some(),
                "live message stream opened"
            );
            LiveFeed::open(&state.site, &session, resume)
                .await
                .into_events()
                .map(live_update)
                .boxed()
        }
        Err(err) => {
            let event = LiveEvent::Error(ApiError::from(err));
            stream::once(async move { sse_event(event) }).boxed()
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
