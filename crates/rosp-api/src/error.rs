//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`LifecycleError`] and collaborator errors to HTTP status codes and
//! a JSON body `{"error": {"code", "message", "details"?}}`. Internal detail
//! is logged, never returned.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use rosp_gateway::{GatewayError, WebhookError};
use rosp_lifecycle::LifecycleError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "DUPLICATE_IDENTITY").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Email or company number already registered (409).
    #[error("{message}")]
    DuplicateIdentity {
        message: String,
        email_taken: bool,
        company_taken: bool,
    },

    /// Conflict with the current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many requests from one source (429).
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    /// An upstream collaborator failed (502).
    #[error("upstream failure: {0}")]
    BadGateway(String),

    /// A required collaborator is not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::DuplicateIdentity { .. } => (StatusCode::CONFLICT, "DUPLICATE_IDENTITY"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::BadGateway(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_FAILURE"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match &self {
            Self::DuplicateIdentity {
                email_taken,
                company_taken,
                ..
            } => Some(serde_json::json!({
                "emailTaken": email_taken,
                "companyTaken": company_taken,
            })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(msg) => Self::Validation(msg),
            LifecycleError::DuplicateIdentity {
                email_taken,
                company_taken,
            } => Self::DuplicateIdentity {
                message: err.to_string(),
                email_taken,
                company_taken,
            },
            LifecycleError::InvalidTransition(msg) => Self::Conflict(msg),
            LifecycleError::NotFound { .. } => Self::NotFound(err.to_string()),
            LifecycleError::DuplicateEvent { .. } | LifecycleError::ConcurrentModification { .. } => {
                Self::Conflict(err.to_string())
            }
            LifecycleError::ExternalService { .. } => Self::BadGateway(err.to_string()),
            LifecycleError::Persistence(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured { .. } => Self::ServiceUnavailable(err.to_string()),
            other => {
                tracing::warn!(error = %other, "collaborator call failed");
                Self::BadGateway(other.to_string())
            }
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Payload(msg) => Self::BadRequest(msg),
            WebhookError::InvalidSecret => Self::Internal(err.to_string()),
            WebhookError::MalformedHeader | WebhookError::Stale | WebhookError::Mismatch => {
                Self::Unauthorized(err.to_string())
            }
        }
    }
}

impl From<rosp_core::ValidationError> for AppError {
    fn from(err: rosp_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
