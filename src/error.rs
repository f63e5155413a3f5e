//! Application error type and its HTTP mapping.
//!
//! Critical-path failures from [`crate::application::services::LinkService`]
//! are returned as distinct variants so the HTTP layer can tell "never existed"
//! ([`AppError::NotFound`]) apart from "temporarily unavailable"
//! ([`AppError::ResolveFailed`]).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

/// Machine-readable error payload.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

/// Which store failed while resolving a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    Cache,
    Store,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Store => f.write_str("store"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("custom code '{code}' is already taken")]
    AliasTaken { code: String },

    #[error("could not allocate a unique code after {attempts} attempts")]
    CreateFailed { attempts: usize },

    #[error("short link '{code}' not found")]
    NotFound { code: String },

    #[error("failed to resolve '{code}' at the {stage} stage: {reason}")]
    ResolveFailed {
        code: String,
        stage: ResolveStage,
        reason: String,
    },

    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn not_found(code: impl Into<String>) -> Self {
        Self::NotFound { code: code.into() }
    }

    pub fn alias_taken(code: impl Into<String>) -> Self {
        Self::AliasTaken { code: code.into() }
    }

    pub fn resolve_failed(
        code: impl Into<String>,
        stage: ResolveStage,
        reason: impl fmt::Display,
    ) -> Self {
        Self::ResolveFailed {
            code: code.into(),
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Returns true when resolution failed because the cache was unreachable.
    pub fn is_cache_failure(&self) -> bool {
        matches!(
            self,
            Self::ResolveFailed {
                stage: ResolveStage::Cache,
                ..
            }
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::AliasTaken { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::ResolveFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::CreateFailed { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Converts the error into the JSON payload sent to clients.
    pub fn to_error_info(&self) -> ErrorInfo {
        let (code, details) = match self {
            Self::Validation { details, .. } => ("validation_error", details.clone()),
            Self::AliasTaken { code } => ("alias_taken", json!({ "code": code })),
            Self::CreateFailed { attempts } => ("create_failed", json!({ "attempts": attempts })),
            Self::NotFound { code } => ("not_found", json!({ "code": code })),
            Self::ResolveFailed { code, stage, .. } => (
                "resolve_failed",
                json!({ "code": code, "stage": stage.to_string() }),
            ),
            Self::Internal { .. } => ("internal_error", json!({})),
        };

        let message = match self {
            // Infrastructure detail stays in the logs.
            Self::ResolveFailed { .. } => "Short link is temporarily unavailable".to_string(),
            _ => self.to_string(),
        };

        ErrorInfo {
            code,
            message,
            details,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(&errors).unwrap_or_else(|_| json!({}));
        Self::bad_request("Request validation failed", details)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            error: self.to_error_info(),
        };

        (status, Json(body)).into_response()
    }
}
