//! Contact and newsletter submissions. Each is one validated round trip with
//! no retries; the caller can watch the phase to render a pending state.

use std::sync::Arc;

use backend::{Backend, BackendError, RowQuery};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{CONTACT_TABLE, SUBSCRIBERS_TABLE},
    error::SiteError,
    protocol::Notice,
    validation::{ContactForm, NewsletterForm},
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormPhase {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

fn to_row<T: Serialize>(value: &T) -> Result<Value, SiteError> {
    serde_json::to_value(value).map_err(|err| SiteError::Network(format!("could not encode form: {err}")))
}

pub struct ContactFormController {
    backend: Arc<dyn Backend>,
    phase: watch::Sender<FormPhase>,
}

impl ContactFormController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (phase, _) = watch::channel(FormPhase::Idle);
        Self { backend, phase }
    }

    pub fn phase(&self) -> watch::Receiver<FormPhase> {
        self.phase.subscribe()
    }

    /// Invalid input fails without touching the backend.
    pub async fn submit(&self, form: &ContactForm) -> Result<Notice, SiteError> {
        let submission = form.validate().inspect_err(|_| {
            self.phase.send_replace(FormPhase::Failed);
        })?;
        self.phase.send_replace(FormPhase::Pending);

        let result = self
            .backend
            .insert(CONTACT_TABLE, to_row(&submission)?)
            .await;
        match result {
            Ok(_) => {
                info!(email = %submission.email, "contact message stored");
                self.phase.send_replace(FormPhase::Succeeded);
                Ok(Notice::success(
                    "Message sent",
                    "Thanks for reaching out! I'll get back to you soon.",
                ))
            }
            Err(err) => {
                warn!(error = %err, "contact submission failed");
                self.phase.send_replace(FormPhase::Failed);
                Err(network("Failed to send message. Please try again later."))
            }
        }
    }
}

pub struct NewsletterController {
    backend: Arc<dyn Backend>,
    phase: watch::Sender<FormPhase>,
}

impl NewsletterController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (phase, _) = watch::channel(FormPhase::Idle);
        Self { backend, phase }
    }

    pub fn phase(&self) -> watch::Receiver<FormPhase> {
        self.phase.subscribe()
    }

    pub async fn subscribe(&self, form: &NewsletterForm) -> Result<Notice, SiteError> {
        let subscriber = form.validate().inspect_err(|_| {
            self.phase.send_replace(FormPhase::Failed);
        })?;
        self.phase.send_replace(FormPhase::Pending);

        let outcome = self.store(&subscriber.email, to_row(&subscriber)?).await;
        match outcome {
            Ok(notice) => {
                self.phase.send_replace(FormPhase::Succeeded);
                Ok(notice)
            }
            Err(err) => {
                warn!(error = %err, "newsletter subscription failed");
                self.phase.send_replace(FormPhase::Failed);
                Err(network("Failed to subscribe. Please try again later."))
            }
        }
    }

    async fn store(&self, email: &str, row: Value) -> Result<Notice, BackendError> {
        let existing = self
            .backend
            .select(SUBSCRIBERS_TABLE, &RowQuery::new().eq("email", email).limit(1))
            .await?;
        if !existing.is_empty() {
            return Ok(already_subscribed(email));
        }

        match self.backend.insert(SUBSCRIBERS_TABLE, row).await {
            Ok(_) => {
                info!(%email, "newsletter subscriber added");
                Ok(Notice::success(
                    "Subscribed",
                    "Thanks for subscribing! You'll hear about new projects and articles.",
                ))
            }
            // Lost a race with a concurrent sign-up for the same address.
            Err(BackendError::Rejected { status: 409, .. }) => Ok(already_subscribed(email)),
            Err(err) => Err(err),
        }
    }
}

fn already_subscribed(email: &str) -> Notice {
    Notice::info(
        "Already subscribed",
        format!("{email} is already on the mailing list."),
    )
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
