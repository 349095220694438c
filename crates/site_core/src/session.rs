//! Holds the signed-in admin for one browser.
//!
//! The current session lives in a `watch` channel, so every subscriber sees
//! the new value as soon as sign-in or sign-out returns.

use std::sync::Arc;

use backend::{Backend, BackendError};
use shared::{
    domain::Session,
    error::SiteError,
    validation::LoginForm,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::describe;

pub struct SessionProvider {
    backend: Arc<dyn Backend>,
    state: watch::Sender<Option<Session>>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(None);
        Self { backend, state }
    }

    /// The live session, or `None`. An expired session is cleared on read.
    pub fn current(&self) -> Option<Session> {
        let session = self.state.borrow().clone();
        match session {
            Some(session) if session.is_expired() => {
                info!(email = %session.email, "session expired");
                self.state.send_replace(None);
                None
            }
            other => other,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SiteError> {
        let email = LoginForm {
            email: email.to_string(),
            password: password.to_string(),
        }
        .validate()?;

        let session = self
            .backend
            .sign_in_with_password(&email, password)
            .await
            .map_err(|err| {
                warn!(%email, error = %err, "sign-in failed");
                match err {
                    BackendError::Unauthorized(message) => SiteError::Auth(message),
                    BackendError::Rejected { message, .. } => SiteError::Auth(message),
                    other => SiteError::Auth(format!(
                        "Sign-in is unavailable right now ({})",
                        describe(&other)
                    )),
                }
            })?;

        info!(email = %session.email, "signed in");
        self.state.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Clears the session before telling the backend, so a failed backend
    /// call still leaves this browser signed out.
    pub async fn sign_out(&self) -> Result<(), SiteError> {
        let Some(session) = self.state.send_replace(None) else {
            return Ok(());
        };
        info!(email = %session.email, "signed out");

        if session.is_expired() {
            return Ok(());
        }
        self.backend
            .sign_out(&session.access_token)
            .await
            .map_err(|err| {
                warn!(error = %err, "backend sign-out failed");
                SiteError::Network(format!(
                    "Signed out locally, but the backend could not be reached ({})",
                    describe(&err)
                ))
            })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
