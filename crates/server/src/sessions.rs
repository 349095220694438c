//! Browser sessions. Each signed-in browser holds an opaque `portfolio_sid`
//! cookie that points at its own `SessionProvider`; the access token never
//! leaves the server.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use chrono::Utc;
use shared::{
    domain::Session,
    error::{ApiError, ErrorCode, SiteError},
};
use site_core::{guard, GuardDecision, SessionProvider};
use tracing::{debug, info};
use uuid::Uuid;

use crate::app_state::AppState;

pub(crate) const SESSION_COOKIE: &str = "portfolio_sid";

#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    providers: Arc<Mutex<HashMap<String, Arc<SessionProvider>>>>,
}

impl SessionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<SessionProvider>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a provider under a fresh id and returns that id.
    pub(crate) fn insert(&self, provider: Arc<SessionProvider>) -> String {
        let sid = Uuid::new_v4().simple().to_string();
        self.lock().insert(sid.clone(), provider);
        sid
    }

    pub(crate) fn get(&self, sid: &str) -> Option<Arc<SessionProvider>> {
        self.lock().get(sid).cloned()
    }

    pub(crate) fn remove(&self, sid: &str) -> Option<Arc<SessionProvider>> {
        self.lock().remove(sid)
    }

    /// The live session behind `sid`. Expired entries are dropped on read.
    pub(crate) fn current(&self, sid: &str) -> Option<Session> {
        let provider = self.get(sid)?;
        let session = provider.current();
        if session.is_none() {
            self.remove(sid);
        }
        session
    }

    /// Drops every entry whose session has ended. Returns how many went.
    pub(crate) fn prune(&self) -> usize {
        let mut providers = self.lock();
        let before = providers.len();
        providers.retain(|_, provider| provider.is_signed_in());
        before - providers.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

pub(crate) fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value that lives as long as the session does.
pub(crate) fn session_cookie(sid: &str, session: &Session, secure: bool) -> String {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    cookie(sid, max_age, secure)
}

pub(crate) fn clear_cookie(secure: bool) -> String {
    cookie("", 0, secure)
}

fn cookie(value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Signs in with a brand new provider so a fixed session id can never be
/// promoted. The previous entry, if any, is discarded.
pub(crate) async fn sign_in(
    state: &AppState,
    previous_sid: Option<&str>,
    email: &str,
    password: &str,
) -> Result<(String, Session), SiteError> {
    let provider = Arc::new(state.site.session_provider());
    let session = provider.sign_in(email, password).await?;
    if let Some(previous) = previous_sid {
        state.sessions.remove(previous);
    }
    let sid = state.sessions.insert(provider);
    debug!(sessions = state.sessions.len(), "browser session created");
    Ok((sid, session))
}

/// Forgets the browser's session. A backend failure is still reported, but
/// the entry is gone either way.
pub(crate) async fn sign_out(state: &AppState, sid: Option<&str>) -> Result<(), SiteError> {
    let Some(provider) = sid.and_then(|sid| state.sessions.remove(sid)) else {
        return Ok(());
    };
    provider.sign_out().await
}

/// Who is asking. Never rejects.
pub(crate) struct Visitor {
    pub(crate) session_id: Option<String>,
    pub(crate) session: Option<Session>,
}

impl Visitor {
    fn from_parts(parts: &Parts, state: &AppState) -> Self {
        let session_id = session_id(&parts.headers);
        let session = session_id
            .as_deref()
            .and_then(|sid| state.sessions.current(sid));
        Self {
            session_id,
            session,
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Visitor {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state))
    }
}

/// A signed-in admin on an HTML route. Anyone else is sent to the login page
/// with the requested location carried in `next`.
pub(crate) struct AdminPage(pub(crate) Session);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminPage {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let visitor = Visitor::from_parts(parts, state);
        let requested = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/");
        match (guard::check(requested, visitor.session.as_ref()), visitor.session) {
            (GuardDecision::Allow, Some(session)) => Ok(Self(session)),
            (GuardDecision::Allow, None) => {
                Err(Redirect::to(&guard::login_redirect_location(requested)))
            }
            (GuardDecision::Redirect { location }, _) => {
                info!(%requested, "unauthenticated visit redirected to login");
                Err(Redirect::to(&location))
            }
        }
    }
}

/// A signed-in admin on a JSON or streaming route.
pub(crate) struct AdminApi(pub(crate) Session);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminApi {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Visitor::from_parts(parts, state)
            .session
            .map(Self)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError::new(ErrorCode::Unauthorized, "sign in required")),
                )
            })
    }
}

#[cfg(test)]
#[path = "tests/sessions_tests.rs"]
mod tests;
