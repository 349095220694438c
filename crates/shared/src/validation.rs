//! Form rules checked before anything touches the network.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{SiteError, ValidationErrors},
    protocol::{NewContactSubmission, NewSubscriber},
};

pub const MIN_MESSAGE_CHARS: usize = 10;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_FIELD_CHARS: usize = 5_000;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

pub fn is_valid_email(candidate: &str) -> bool {
    candidate.len() <= 254 && email_pattern().is_match(candidate)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if email.is_empty() {
        errors.push("email", "Email is required");
    } else if !is_valid_email(email) {
        errors.push("email", "Invalid email address");
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<NewContactSubmission, SiteError> {
        let name = self.name.trim();
        let email = self.email.trim();
        let message = self.message.trim();

        let mut errors = ValidationErrors::default();
        if name.is_empty() {
            errors.push("name", "Name is required");
        } else if name.chars().count() > 200 {
            errors.push("name", "Name must be at most 200 characters");
        }
        check_email(&mut errors, email);
        let message_chars = message.chars().count();
        if message_chars < MIN_MESSAGE_CHARS {
            errors.push(
                "message",
                format!("Message must be at least {MIN_MESSAGE_CHARS} characters"),
            );
        } else if message_chars > MAX_FIELD_CHARS {
            errors.push(
                "message",
                format!("Message must be at most {MAX_FIELD_CHARS} characters"),
            );
        }
        errors.into_result()?;

        Ok(NewContactSubmission {
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsletterForm {
    #[serde(default)]
    pub email: String,
}

impl NewsletterForm {
    pub fn validate(&self) -> Result<NewSubscriber, SiteError> {
        let email = normalize_email(&self.email);
        let mut errors = ValidationErrors::default();
        check_email(&mut errors, &email);
        errors.into_result()?;
        Ok(NewSubscriber { email })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    /// Returns the trimmed email; the password is passed through untouched.
    pub fn validate(&self) -> Result<String, SiteError> {
        let email = self.email.trim();
        let mut errors = ValidationErrors::default();
        check_email(&mut errors, email);
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            errors.push(
                "password",
                format!("Password must be at least {MIN_PASSWORD_CHARS} characters"),
            );
        }
        errors.into_result()?;
        Ok(email.to_string())
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
