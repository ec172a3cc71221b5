//! Error response formatting
//!
//! Renders [`AppError`] as the JSON body every integrator can rely on:
//! `success:false`, a machine code, a message and optional field details.

use crate::error::{AppError, AppErrorKind, DomainError, ErrorCode};
use axum::{
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false, lets partner integrations branch the same way as on success bodies
    pub success: bool,

    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Field-level validation details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            success: false,
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details: error.details(),
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                context = ?self.context,
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "request failed"
            );
        } else {
            tracing::warn!(
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "request refused"
            );
        }

        let body = ErrorResponse::from_app_error(&self);
        let mut response = (status_code, Json(body)).into_response();
        if let AppErrorKind::Domain(DomainError::Throttled { retry_after_secs }) = &self.kind {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// `x-request-id` assigned by the request-id layer, if any
pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
