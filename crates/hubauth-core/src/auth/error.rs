use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::TransportError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Hub rejected token request ({status}): {details}")]
    AuthServer { status: StatusCode, details: String },

    #[error("Token verification failed ({status}): {details}")]
    Verification { status: StatusCode, details: String },

    #[error("Token refresh rejected ({status}): {details}")]
    Refresh { status: StatusCode, details: String },

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Not authenticated - no credential is held or cached")]
    NotAuthenticated,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential store error: {0:#}")]
    Store(anyhow::Error),
}

impl AuthError {
    /// Turn a token endpoint rejection into a refresh rejection
    pub(crate) fn into_refresh(self) -> Self {
        match self {
            AuthError::AuthServer { status, details } => AuthError::Refresh { status, details },
            other => other,
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error fields the hub puts in token endpoint responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<Value>,
    error_code: Option<Value>,
    error_description: Option<String>,
    error_developer_message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|v| !v.is_null())
            || self.error_code.as_ref().is_some_and(|v| !v.is_null())
    }

    fn details(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.error_developer_message.clone())
            .or_else(|| self.error.as_ref().and_then(value_text))
            .or_else(|| self.error_code.as_ref().and_then(value_text))
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Human-readable details of a failed response
pub(crate) fn response_details(body: &str) -> String {
    if let Some(details) = ErrorBody::parse(body).and_then(|b| b.details()) {
        return details;
    }
    if body.trim().is_empty() {
        "no details".to_string()
    } else {
        truncate_body(body)
    }
}

/// Details of an error-shaped body, if a 2xx response carries one
pub(crate) fn error_in_body(body: &str) -> Option<String> {
    let parsed = ErrorBody::parse(body)?;
    if parsed.is_error() {
        Some(parsed.details().unwrap_or_else(|| truncate_body(body)))
    } else {
        None
    }
}
