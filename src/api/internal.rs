//! Endpoints called by other Flouci services, never by integrators

use crate::api::validation::{self, extract_json};
use crate::api::AppState;
use crate::auth::signature::{signature_is_valid, SIGNATURE_HEADER};
use crate::auth::InternalCaller;
use crate::error::{AppError, CredentialError, ValidationError};
use crate::services::ledger::Settlement;
use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Upstream send-money confirmation. Parsed leniently so the signature can be
/// checked before the fields are.
#[derive(Debug, Deserialize)]
pub struct CatcherPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

fn invalid_result(reason: &str) -> ValidationError {
    ValidationError::InvalidField {
        field: "result".to_string(),
        reason: reason.to_string(),
    }
}

pub async fn send_money_catcher(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Result<Json<CatcherPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let payload = extract_json(body)?;
    let id = payload.id.unwrap_or_default();

    let presented = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !signature_is_valid(
        &state.gateway.signature_secret,
        method.as_str(),
        uri.path(),
        &id,
        presented,
    ) {
        warn!(path = uri.path(), "callback with invalid signature");
        return Err(CredentialError::InvalidSignature.into());
    }

    let operation_id = validation::uuid("id", &id)?;
    let result = payload
        .result
        .filter(Value::is_object)
        .ok_or_else(|| invalid_result("Must be a JSON object"))?;
    if !result.get("success").is_some_and(Value::is_boolean) {
        return Err(invalid_result("'success' must be a boolean").into());
    }

    let response = match state.ledger.settle(operation_id, &result).await? {
        Settlement::Approved { webhook_sent, .. } => {
            info!(%operation_id, webhook_sent, "callback settled operation");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Operation {} validated", operation_id),
                })),
            )
        }
        Settlement::Declined { .. } => (
            StatusCode::PRECONDITION_FAILED,
            Json(json!({
                "success": false,
                "message": format!("Operation {} aborted", operation_id),
            })),
        ),
    };

    Ok(response.into_response())
}

pub async fn check_user_exists(
    State(state): State<AppState>,
    caller: InternalCaller,
    Path(tracking_id): Path<String>,
) -> Result<Response, AppError> {
    let tracking_id = validation::uuid("tracking_id", &tracking_id)?;

    // An application may only ask about its own owner
    if let InternalCaller::Application(application) = &caller {
        if application.tracking_id != Some(tracking_id) {
            return Ok(Json(json!({
                "success": false,
                "result": { "message": "bad input" },
            }))
            .into_response());
        }
    }

    let response = if state.applications.exists_for_tracking_id(tracking_id).await? {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "result": { "message": "User exists" },
            })),
        )
    } else {
        (
            StatusCode::PRECONDITION_FAILED,
            Json(json!({
                "success": false,
                "result": { "message": "User has no developer account" },
            })),
        )
    };

    Ok(response.into_response())
}
