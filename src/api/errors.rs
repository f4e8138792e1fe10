//! API Error Handling
//!
//! Failures of the HTTP wallet endpoints, mapped to status codes and a
//! `{message, errorsList?}` body.

use crate::{auth::AuthError, operations::OperationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Error body returned to HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_list: Option<Vec<String>>,
}

/// API error with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    BadRequest(Vec<String>),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    pub fn bad_request(request_id: String, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(vec![message.into()]),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, err: AuthError) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(err.to_string()),
            request_id,
        }
    }

    pub fn from_operation(request_id: String, err: OperationError) -> Self {
        let kind = match err.status_code() {
            400 => ApiErrorKind::BadRequest(err.messages()),
            404 => ApiErrorKind::NotFound(err.to_string()),
            409 => ApiErrorKind::Conflict(err.to_string()),
            _ => {
                error!("[{}] Operation failed: {}", request_id, err);
                ApiErrorKind::InternalError(err.to_string())
            }
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::BadRequest(msgs) => {
                write!(f, "[{}] Bad Request: {}", self.request_id, msgs.join("; "))
            }
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.kind {
            // A single validation problem is reported as the message itself
            ApiErrorKind::BadRequest(mut msgs) if msgs.len() == 1 => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    message: msgs.remove(0),
                    errors_list: None,
                },
            ),
            ApiErrorKind::BadRequest(msgs) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    message: "Request rejected, check error list".to_string(),
                    errors_list: Some(msgs),
                },
            ),
            ApiErrorKind::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    message,
                    errors_list: None,
                },
            ),
            ApiErrorKind::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    message,
                    errors_list: None,
                },
            ),
            ApiErrorKind::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    message,
                    errors_list: None,
                },
            ),
            ApiErrorKind::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    message,
                    errors_list: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
