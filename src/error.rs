use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::middleware::gate::{CsrfRejection, GateOutcome};
use crate::validation::ValidationResult;

/// The primary error type for the application.
///
/// Security rejections carry no client-supplied data so responses never echo a
/// token or an identity back.
#[derive(Debug)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    Internal(anyhow::Error),
    /// Undecodable body or unsupported content type.
    MalformedInput(String),
    /// One or more registration fields failed validation.
    Validation(ValidationResult),
    /// The client exceeded its request quota for the current window.
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
    /// The anti-forgery token was absent or did not verify.
    CsrfRejected(CsrfRejection),
    /// For when a request conflicts with existing data.
    Conflict {
        field: String,
        message: String,
    },
    /// The method has no entry in the endpoint's dispatch table.
    MethodNotAllowed {
        allow: &'static str,
    },
    /// For errors related to database operations.
    Database(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
            AppError::Validation(result) => {
                write!(f, "Validation failed with {} error(s)", result.error_count())
            }
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
            AppError::CsrfRejected(CsrfRejection::Missing) => write!(f, "CSRF token missing"),
            AppError::CsrfRejected(CsrfRejection::Invalid) => write!(f, "CSRF token invalid"),
            AppError::Conflict { field, message } => write!(f, "Conflict on '{}': {}", field, message),
            AppError::MethodNotAllowed { .. } => write!(f, "Method not allowed"),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    /// Maps a terminal gate outcome to its error. `Proceed` has no error.
    pub fn from_gate(outcome: GateOutcome) -> Option<Self> {
        match outcome {
            GateOutcome::Proceed => None,
            GateOutcome::RateLimited { retry_after_seconds } => {
                Some(AppError::RateLimited { retry_after_seconds })
            }
            GateOutcome::CsrfRejected(reason) => Some(AppError::CsrfRejected(reason)),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MalformedInput(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::CsrfRejected(_) => StatusCode::FORBIDDEN,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut retry_after = None;
        let mut allow = None;

        let (error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                (
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::MalformedInput(msg) => ("MALFORMED_INPUT", msg, None),
            AppError::Validation(result) => (
                "VALIDATION_ERROR",
                "One or more fields are invalid".to_string(),
                Some(json!({ "fields": result.errors })),
            ),
            AppError::RateLimited { retry_after_seconds } => {
                retry_after = Some(retry_after_seconds);
                (
                    "RATE_LIMITED",
                    "Rate limit exceeded".to_string(),
                    Some(json!({ "retry_after_seconds": retry_after_seconds })),
                )
            }
            AppError::CsrfRejected(CsrfRejection::Missing) => {
                ("CSRF_TOKEN_MISSING", "CSRF token missing".to_string(), None)
            }
            AppError::CsrfRejected(CsrfRejection::Invalid) => {
                ("CSRF_TOKEN_INVALID", "CSRF token invalid".to_string(), None)
            }
            AppError::Conflict { field, message } => {
                let details = json!({ field.clone(): message.clone() });
                ("CONFLICT", message, Some(details))
            }
            AppError::MethodNotAllowed { allow: methods } => {
                allow = Some(methods);
                ("METHOD_NOT_ALLOWED", "Method not allowed!".to_string(), None)
            }
            AppError::Database(msg) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Database error: {}", msg);
                (
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(methods) = allow {
            response.headers_mut().insert(header::ALLOW, HeaderValue::from_static(methods));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::anyhow!("background task failed: {}", err))
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;
