//! Response shapes shared by the handlers.
//!
//! Developer endpoints wrap every answer in `{result, name, code, version}`;
//! partner endpoints pass the normalized upstream body through with the
//! upstream status.

use crate::backend::{BackendResult, Body, UpstreamFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

pub const DEVELOPERS: &str = "developers";
pub const CHECK_SEND_MONEY_STATUS: &str = "check_send_money_status";

pub fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub result: Value,
    pub name: &'static str,
    pub code: i64,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn success(name: &'static str, version: &str, result: Value) -> Self {
        Self {
            result,
            name,
            code: 0,
            version: version.to_string(),
            message: None,
        }
    }

    /// `result.error` carries the upstream result (or message),
    /// `result.details` its `non_field_errors`.
    pub fn failure(name: &'static str, version: &str, failure: &UpstreamFailure) -> Self {
        Self {
            result: json!({
                "success": false,
                "error": failure.error_value(),
                "details": failure.non_field_errors.clone().unwrap_or(Value::Null),
            }),
            name,
            code: 1,
            version: version.to_string(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn into_response_with(self, status_code: u16) -> Response {
        (status(status_code), Json(self)).into_response()
    }
}

/// Upstream answer as a partner response: flattened body, upstream status.
pub fn passthrough(result: BackendResult<Body>) -> Response {
    let (status_code, body) = flatten(result);
    (status(status_code), Json(body)).into_response()
}

pub fn flatten(result: BackendResult<Body>) -> (u16, Value) {
    match result {
        Ok(upstream) => (upstream.status_code, upstream.into_json()),
        Err(failure) => (failure.status_code, failure.to_json()),
    }
}

/// `{success, message}` with an explicit status
pub fn message(status_code: StatusCode, success: bool, message: impl Into<String>) -> Response {
    (
        status_code,
        Json(json!({ "success": success, "message": message.into() })),
    )
        .into_response()
}
