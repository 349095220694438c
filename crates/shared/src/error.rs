use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    Validation,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

/// One inline message attached to a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    pub fn into_result(self) -> Result<(), SiteError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SiteError::Validation(self))
        }
    }
}

/// What a visitor can run into. None of these are fatal to the process.
#[derive(Debug, Clone, Error)]
pub enum SiteError {
    #[error("please correct the highlighted fields")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Network(String),
}

impl From<SiteError> for ApiError {
    fn from(value: SiteError) -> Self {
        match value {
            SiteError::Validation(errors) => Self {
                code: ErrorCode::Validation,
                message: "please correct the highlighted fields".to_string(),
                fields: errors.fields,
            },
            SiteError::Auth(message) => Self::new(ErrorCode::Unauthorized, message),
            SiteError::Network(message) => Self::new(ErrorCode::Unavailable, message),
        }
    }
}
