//! Standardized error handling for the Tally API
//!
//! Every handler returns `ApiResult<T>`; failures render as
//! `{success: false, error, code, ...}` with a matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    /// Human-readable error message
    pub error: String,
    /// Error code (e.g., "VALIDATION_ERROR", "NOT_FOUND", "ALREADY_INVOICED")
    pub code: String,
    /// Field-level errors for validation, or the underlying cause for server errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Existing invoice when issuance short-circuits
    #[serde(rename = "invoiceId", skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<i32>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.into(),
            details: None,
            invoice_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    // Convenience constructors for common error types

    /// 404 for `<entity> not found`
    pub fn not_found(entity: impl Into<String>) -> AppError {
        AppError::NotFound(entity.into())
    }

    pub fn bad_request(message: impl Into<String>) -> AppError {
        AppError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> AppError {
        AppError::Conflict(message.into())
    }

    /// `<field> is required`
    pub fn required(field: &str) -> AppError {
        Self::validation_single(field, format!("{} is required", field))
    }

    pub fn validation_single(field: impl Into<String>, message: impl Into<String>) -> AppError {
        let mut details = HashMap::new();
        details.insert(field.into(), vec![message.into()]);
        AppError::ValidationError { details }
    }

    pub fn validation(details: HashMap<String, Vec<String>>) -> AppError {
        AppError::ValidationError { details }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),
    Conflict(String),
    AlreadyInvoiced { invoice_id: i32 },

    // Validation errors
    ValidationError { details: HashMap<String, Vec<String>> },
    BadRequest(String),

    // Accounting errors
    MissingAccount { company_id: i32, code: String },
    UnbalancedEntry(String),

    // Server errors
    InternalError(String),
    DatabaseError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AlreadyInvoiced { .. } => StatusCode::BAD_REQUEST,
            Self::ValidationError { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingAccount { .. } => StatusCode::BAD_REQUEST,
            Self::UnbalancedEntry(_) | Self::InternalError(_) | Self::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::AlreadyInvoiced { .. } => "ALREADY_INVOICED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::MissingAccount { .. } => "MISSING_ACCOUNT",
            Self::UnbalancedEntry(_) => "UNBALANCED_ENTRY",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotFound(entity) => format!("{} not found", entity),
            Self::Conflict(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::AlreadyInvoiced { .. } => "Invoice already exists".to_string(),
            // A single field error reads better as the top-level message
            Self::ValidationError { details } => {
                let mut messages: Vec<&String> = details.values().flatten().collect();
                messages.sort();
                match messages.as_slice() {
                    [only] => (*only).clone(),
                    _ => "Validation failed".to_string(),
                }
            }
            Self::MissingAccount { company_id, code } => {
                format!("Account {} is not configured for company {}", code, company_id)
            }
            Self::UnbalancedEntry(_) => "Journal entry is not balanced".to_string(),
            Self::InternalError(_) => "An internal error occurred".to_string(),
            Self::DatabaseError(_) => "A database error occurred".to_string(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        match &self {
            Self::ValidationError { details } => {
                error.details = serde_json::to_value(details).ok();
            }
            Self::AlreadyInvoiced { invoice_id } => {
                error.invoice_id = Some(*invoice_id);
            }
            Self::UnbalancedEntry(cause) | Self::InternalError(cause) | Self::DatabaseError(cause) => {
                tracing::error!("{}: {}", self.error_code(), cause);
                error.details = Some(serde_json::Value::String(cause.clone()));
            }
            _ => {}
        }

        (status, Json(error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

/// Result type alias for handlers and services
pub type ApiResult<T> = Result<T, AppError>;

/// Accumulates field errors before failing a request
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.push(field, message);
        self
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }

    /// `Ok(())` when nothing was recorded
    pub fn finish(self) -> ApiResult<()> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
