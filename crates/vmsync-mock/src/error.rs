//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] renders the backend's error envelope:
//! `{"error": {"code", "message", "details"?}}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use vmsync_core::wire::{codes, ErrorBody, ErrorEnvelope};
use vmsync_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown template (404).
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Unknown session (404).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Unknown execution (404).
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// The session exists but is not `ready` (409).
    #[error("session not ready: {0}")]
    SessionNotReady(String),

    /// Well-formed request with invalid field values (400).
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed request body (400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TemplateNotFound(_)
            | ApiError::SessionNotFound(_)
            | ApiError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionNotReady(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::TemplateNotFound(_) => codes::TEMPLATE_NOT_FOUND,
            ApiError::SessionNotFound(_) => codes::SESSION_NOT_FOUND,
            ApiError::ExecutionNotFound(_) => codes::EXECUTION_NOT_FOUND,
            ApiError::SessionNotReady(_) => codes::SESSION_NOT_READY,
            ApiError::Validation(_) => codes::VALIDATION_ERROR,
            ApiError::InvalidRequest(_) => codes::INVALID_REQUEST,
            ApiError::Internal(_) => codes::INTERNAL,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::TemplateNotFound(_) => "Template not found".to_string(),
            ApiError::SessionNotFound(_) => "Session not found".to_string(),
            ApiError::ExecutionNotFound(_) => "Execution not found".to_string(),
            ApiError::SessionNotReady(_) => "Session is not ready".to_string(),
            ApiError::Validation(msg) | ApiError::InvalidRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::TemplateNotFound(id) => Some(json!({ "template_id": id })),
            ApiError::SessionNotFound(id) | ApiError::SessionNotReady(id) => {
                Some(json!({ "session_id": id }))
            }
            ApiError::ExecutionNotFound(id) => Some(json!({ "execution_id": id })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: Some(self.code().to_string()),
                message: Some(self.message()),
                details: self.details(),
            },
        };
        (self.status(), axum::Json(envelope)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::UnknownSessionStatus(_) | CoreError::UnknownExecutionStatus(_) => {
                ApiError::Validation(err.to_string())
            }
            CoreError::IllegalTransition { .. } => ApiError::Internal(err.to_string()),
        }
    }
}
