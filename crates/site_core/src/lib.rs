//! The site's behaviour independent of HTTP: who is signed in, which routes
//! they may see, the live message list and the form round trips.

use std::sync::Arc;

use backend::{Backend, BackendError, RowQuery};
use shared::{
    domain::{Session, CONTACT_TABLE},
    error::SiteError,
};
use tracing::warn;

pub mod forms;
pub mod guard;
pub mod messages;
pub mod projects;
pub mod resume;
pub mod session;

pub use forms::{ContactFormController, FormPhase, NewsletterController};
pub use guard::{GuardDecision, Route};
pub use messages::{ListState, MessageList, MessageListController};
pub use projects::{Category, ProjectCatalog};
pub use resume::ResumeFile;
pub use session::SessionProvider;

/// Shared handles every request works from.
#[derive(Clone)]
pub struct SiteContext {
    pub backend: Arc<dyn Backend>,
    pub resume_bucket: String,
}

impl SiteContext {
    pub fn new(backend: Arc<dyn Backend>, resume_bucket: impl Into<String>) -> Self {
        Self {
            backend,
            resume_bucket: resume_bucket.into(),
        }
    }

    pub fn session_provider(&self) -> SessionProvider {
        SessionProvider::new(self.backend.clone())
    }

    pub fn catalog(&self) -> ProjectCatalog {
        ProjectCatalog::new(self.backend.clone())
    }

    pub fn contact_form(&self) -> ContactFormController {
        ContactFormController::new(self.backend.clone())
    }

    pub fn newsletter(&self) -> NewsletterController {
        NewsletterController::new(self.backend.clone())
    }

    /// Starts the admin's message list under their own credentials.
    pub fn open_messages(&self, session: &Session) -> MessageListController {
        MessageListController::start(self.backend.clone(), Some(session.access_token.clone()))
    }

    pub async fn latest_resume(&self) -> Result<Option<ResumeFile>, SiteError> {
        resume::latest(self.backend.as_ref(), &self.resume_bucket).await
    }

    /// One-row read against the contact table.
    pub async fn check_backend(&self) -> Result<(), SiteError> {
        self.backend
            .select(CONTACT_TABLE, &RowQuery::new().limit(1))
            .await
            .map(|_| ())
            .map_err(|err| {
                warn!(error = %err, "backend connection check failed");
                network("Could not connect to the database. Please try again later.")
            })
    }
}

pub(crate) fn network(message: &str) -> SiteError {
    SiteError::Network(message.to_string())
}

pub(crate) fn describe(err: &BackendError) -> &'static str {
    match err {
        BackendError::Network(_) | BackendError::Closed => "backend unreachable",
        BackendError::Unauthorized(_) => "backend refused credentials",
        BackendError::Rejected { .. } => "backend rejected request",
        BackendError::Decode(_) => "backend sent an unexpected payload",
    }
}

#[cfg(test)]
#[path = "tests/fake_backend.rs"]
pub(crate) mod fake_backend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
