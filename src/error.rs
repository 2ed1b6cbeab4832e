//!
//! # Custom Error Handling
//!
//! This module defines the error type `AppError` used throughout the application.
//! The core services raise the typed kinds (`DuplicateEmail`, `InvalidCredentials`,
//! `NotFound`, `StorageUnavailable`, `Unexpected`); validation failures are produced
//! by the transport layer before the core runs.
//!
//! `AppError` implements `actix_web::error::ResponseError` so handlers can return it
//! directly. Storage errors are never surfaced raw: the `From<sqlx::Error>`
//! conversion sorts them into `StorageUnavailable` or `Unexpected`, and the 5xx
//! responses carry a generic message while the detail goes to the log.

use std::collections::BTreeMap;

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

/// SQLSTATE for `unique_violation`.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Message shared by both failed-login causes.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Messages for each offending input field, keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Field-level input validation failed (HTTP 422).
    #[error("Validation failed: {}", describe_fields(.0))]
    ValidationFailed(FieldErrors),
    /// The email is already registered (HTTP 400).
    #[error("Email already exists")]
    DuplicateEmail,
    /// Unknown email or wrong password; both causes share this variant (HTTP 401).
    #[error("{}", INVALID_CREDENTIALS_MESSAGE)]
    InvalidCredentials,
    /// Missing or invalid bearer token (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The resource does not exist or is not visible to the caller (HTTP 404).
    #[error("{0} not found")]
    NotFound(String),
    /// A well-formed request the server refuses to apply (HTTP 400).
    #[error("{0}")]
    BadRequest(String),
    /// Transient infrastructure failure: connection loss, pool exhaustion, timeout (HTTP 503).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Anything else (HTTP 500).
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// A validation failure on a single field.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        AppError::ValidationFailed(errors)
    }

    /// Message sent to the client. Server-side failures are reported generically.
    fn public_message(&self) -> String {
        match self {
            AppError::StorageUnavailable(_) => {
                "Storage is temporarily unavailable. Please try again later.".to_string()
            }
            AppError::Unexpected(_) => "An unexpected error occurred.".to_string(),
            AppError::ValidationFailed(_) => "Validation failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// Converts `AppError` variants into JSON `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateEmail | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("{}", self);
        }
        let mut body = json!({ "error": self.public_message() });
        if let AppError::ValidationFailed(fields) = self {
            body["errors"] = json!(fields);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

fn describe_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Converts `sqlx::Error` into `AppError`.
///
/// Connection-level failures become `StorageUnavailable`; everything else the
/// core did not anticipate becomes `Unexpected`. Unique violations are translated
/// by the store that knows which constraint was hit.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match &error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".into()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StorageUnavailable(error.to_string()),
            sqlx::Error::Database(db) => {
                // Class 08 is "connection exception", 57P0x are server shutdowns.
                let transient = db
                    .code()
                    .map(|code| code.starts_with("08") || code.starts_with("57P0"))
                    .unwrap_or(false);
                if transient {
                    AppError::StorageUnavailable(error.to_string())
                } else {
                    AppError::Unexpected(error.to_string())
                }
            }
            _ => AppError::Unexpected(error.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        let fields = error
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages = errors.iter().map(field_message).collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::ValidationFailed(fields)
    }
}

fn field_message(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let bound = |name: &str| error.params.get(name).map(whole_number);
    let (min, max) = (bound("min"), bound("max"));
    match (error.code.as_ref(), min, max) {
        ("length", Some(min), Some(max)) => {
            format!("must be between {} and {} characters long", min, max)
        }
        ("length", Some(min), None) => format!("must be at least {} characters long", min),
        ("length", None, Some(max)) => format!("must be at most {} characters long", max),
        ("range", Some(min), _) => format!("must be at least {}", min),
        ("range", None, Some(max)) => format!("must be at most {}", max),
        ("email", _, _) => "must be a valid email address".to_string(),
        (code, _, _) => format!("failed the {} check", code),
    }
}

/// Range bounds arrive as floats; `1.0` reads better as `1`.
fn whole_number(value: &serde_json::Value) -> String {
    match value.as_f64() {
        Some(number) if number.fract() == 0.0 => format!("{}", number as i64),
        _ => value.to_string(),
    }
}

/// JWT processing failures at the transport are authentication failures.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(format!("Invalid token: {}", error))
    }
}
