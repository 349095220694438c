use shared::domain::{ProjectId, Session};
use url::form_urlencoded;

pub const LOGIN_PATH: &str = "/login";
pub const DEFAULT_AFTER_LOGIN: &str = "/admin/messages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    About,
    Contact,
    Project(ProjectId),
    Login,
    AdminMessages,
}

impl Route {
    /// Maps a request path (query string ignored) to a page.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(Self::Home),
            "/about" => Some(Self::About),
            "/contact" => Some(Self::Contact),
            "/login" => Some(Self::Login),
            "/admin/messages" => Some(Self::AdminMessages),
            other => {
                let id = other.strip_prefix("/project/")?;
                (!id.is_empty() && !id.contains('/')).then(|| Self::Project(ProjectId::from(id)))
            }
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::About => "/about".to_string(),
            Self::Contact => "/contact".to_string(),
            Self::Project(id) => format!("/project/{id}"),
            Self::Login => LOGIN_PATH.to_string(),
            Self::AdminMessages => DEFAULT_AFTER_LOGIN.to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::AdminMessages)
    }
}

/// Everything under `/admin` is protected, including feeds behind the pages.
pub fn path_requires_auth(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path == "/admin" || path.starts_with("/admin/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect { location: String },
}

/// Decides whether `requested` (path plus optional query) may be shown.
pub fn check(requested: &str, session: Option<&Session>) -> GuardDecision {
    let signed_in = session.is_some_and(|session| !session.is_expired());
    if signed_in || !path_requires_auth(requested) {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect {
            location: login_redirect_location(requested),
        }
    }
}

pub fn login_redirect_location(requested: &str) -> String {
    let next: String = form_urlencoded::byte_serialize(requested.as_bytes()).collect();
    format!("{LOGIN_PATH}?next={next}")
}

/// Where to go after signing in. Only local absolute paths are honoured.
pub fn post_login_destination(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(next) if is_local_path(next) && !next.starts_with(LOGIN_PATH) => next.to_string(),
        _ => DEFAULT_AFTER_LOGIN.to_string(),
    }
}

fn is_local_path(candidate: &str) -> bool {
    candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.starts_with("/\\")
        && !candidate.chars().any(char::is_control)
}

#[cfg(test)]
#[path = "tests/guard_tests.rs"]
mod tests;
