//! Partner endpoints: account linking, partner-user lookups and payments

use crate::api::envelope::{self, message};
use crate::api::validation::{self, extract_validated_json, extract_validated_query, Validate};
use crate::api::AppState;
use crate::auth::credentials::resolve_partner_user;
use crate::auth::PartnerApplication;
use crate::error::{AppError, DomainError, ValidationError};
use crate::models::{Application, LinkedAccount};
use crate::services::history::HistoryParams;
use crate::services::ledger::InitiatedPayment;
use crate::services::link_account::{ConfirmOutcome, InitiateOutcome};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

const ALREADY_LINKED: &str = "Account already linked.";
const UNEXPECTED_ERROR: &str = "Unexpected error occurred";

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone_number: String,
}

impl Validate for PhoneRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::phone_number("phone_number", &self.phone_number)
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmLinkRequest {
    pub phone_number: String,
    pub session_id: String,
    pub otp: String,
}

impl Validate for ConfirmLinkRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::phone_number("phone_number", &self.phone_number)?;
        validation::uuid("session_id", &self.session_id)?;
        validation::otp("otp", &self.otp)
    }
}

/// `phone_number` + `tracking_id` naming a linked partner user
#[derive(Debug, Deserialize)]
pub struct PartnerUserRequest {
    pub phone_number: String,
    pub tracking_id: String,
}

impl Validate for PartnerUserRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::phone_number("phone_number", &self.phone_number)?;
        validation::uuid("tracking_id", &self.tracking_id).map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub phone_number: String,
    pub tracking_id: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub operation_type: Option<String>,
    pub operation_status: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl Validate for HistoryQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::phone_number("phone_number", &self.phone_number)?;
        validation::uuid("tracking_id", &self.tracking_id).map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub phone_number: String,
    pub tracking_id: String,
    pub amount_in_millimes: i64,
    pub product: String,
    pub webhook: Option<String>,
}

impl Validate for InitiatePaymentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::phone_number("phone_number", &self.phone_number)?;
        validation::uuid("tracking_id", &self.tracking_id)?;
        validation::product("product", &self.product)?;
        if let Some(webhook) = &self.webhook {
            validation::http_url("webhook", webhook)?;
        }
        Ok(())
    }
}

/// Resolve an already-validated partner user for this application.
async fn partner_user(
    state: &AppState,
    application: &Application,
    phone_number: &str,
    tracking_id: &str,
) -> Result<LinkedAccount, AppError> {
    let tracking_id = validation::uuid("tracking_id", tracking_id)?;
    resolve_partner_user(
        state.linked_accounts.as_ref(),
        application,
        phone_number,
        tracking_id,
    )
    .await
}

pub async fn initiate_link_account(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<PhoneRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;

    let response = match state.links.initiate(&application, &request.phone_number).await? {
        InitiateOutcome::AlreadyLinked => message(StatusCode::ACCEPTED, false, ALREADY_LINKED),
        InitiateOutcome::Started {
            status_code,
            session_id,
            name,
            phone_number,
            message,
        } => (
            envelope::status(status_code),
            Json(json!({
                "success": true,
                "session_id": session_id,
                "name": name,
                "phone_number": phone_number,
                "message": message,
            })),
        )
            .into_response(),
        InitiateOutcome::Failed { status_code } => {
            message(envelope::status(status_code), false, UNEXPECTED_ERROR)
        }
    };

    Ok(response)
}

pub async fn confirm_link_account(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<ConfirmLinkRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let session_id = validation::uuid("session_id", &request.session_id)?;

    let response = match state
        .links
        .confirm(&application, &request.phone_number, session_id, &request.otp)
        .await?
    {
        ConfirmOutcome::Linked {
            status_code,
            account,
        } => (
            envelope::status(status_code),
            Json(json!({
                "success": true,
                "tracking_id": account.partner_tracking_id,
            })),
        )
            .into_response(),
        ConfirmOutcome::Rejected {
            status_code,
            message,
        } => (
            envelope::status(status_code),
            Json(json!({ "success": false, "message": message })),
        )
            .into_response(),
    };

    Ok(response)
}

pub async fn is_flouci(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<PhoneRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let result = state
        .backend
        .is_flouci(&request.phone_number, application.merchant_id)
        .await;
    Ok(envelope::passthrough(result))
}

/// Looks the account up by partner tracking id only; the phone number is
/// forwarded for the upstream to check.
pub async fn authenticate(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<PartnerUserRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let tracking_id = validation::uuid("tracking_id", &request.tracking_id)?;

    let account = state
        .linked_accounts
        .find_active_by_partner_id(tracking_id, application.merchant_id)
        .await?
        .ok_or(DomainError::AccountNotLinked)?;

    let result = state
        .backend
        .generate_authentication_token(&request.phone_number, &account)
        .await;
    Ok(envelope::passthrough(result))
}

pub async fn balance(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    query: Result<Query<PartnerUserRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_query(query)?;
    let account =
        partner_user(&state, &application, &request.phone_number, &request.tracking_id).await?;

    let result = state
        .backend
        .get_user_balance(account.account_tracking_id)
        .await;
    Ok(envelope::passthrough(result))
}

pub async fn history(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_validated_query(query)?;
    let account =
        partner_user(&state, &application, &query.phone_number, &query.tracking_id).await?;

    let filter = HistoryParams {
        from_date: query.from_date,
        to_date: query.to_date,
        operation_type: query.operation_type,
        operation_status: query.operation_status,
        page: query.page,
        size: query.size,
    }
    .into_filter(account.partner_tracking_id, Utc::now())?;

    let page = state.history.list(&filter).await?;
    Ok(Json(page).into_response())
}

async fn start_payment(
    state: &AppState,
    application: &Application,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<(InitiatedPayment, Value, u16), AppError> {
    let request = extract_validated_json(body)?;
    validation::range(
        "amount_in_millimes",
        request.amount_in_millimes,
        Some(state.gateway.min_payment_millimes),
        None,
    )?;

    let account =
        partner_user(state, application, &request.phone_number, &request.tracking_id).await?;

    let payment = state
        .ledger
        .initiate_payment(
            &account,
            request.amount_in_millimes,
            &request.product,
            request.webhook,
        )
        .await?;

    info!(
        operation_id = %payment.operation.operation_id,
        status = %payment.operation.operation_status,
        "payment initiated"
    );

    let (status_code, body) = envelope::flatten(payment.upstream.clone());
    Ok((payment, body, status_code))
}

fn with_operation_id(mut body: Value, operation_id: Uuid) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert(
            "operation_id".to_string(),
            Value::String(operation_id.to_string()),
        );
    }
    body
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let (payment, body, status_code) = start_payment(&state, &application, body).await?;
    let body = with_operation_id(body, payment.operation.operation_id);
    Ok((envelope::status(status_code), Json(body)).into_response())
}

/// Same flow; the upstream `hash` stays internal.
pub async fn initiate_payment_v1(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let (payment, mut body, status_code) = start_payment(&state, &application, body).await?;
    if let Value::Object(map) = &mut body {
        map.remove("hash");
    }
    let body = with_operation_id(body, payment.operation.operation_id);
    Ok((envelope::status(status_code), Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_payment_validation() {
        let request = InitiatePaymentRequest {
            phone_number: "22123456".to_string(),
            tracking_id: Uuid::new_v4().to_string(),
            amount_in_millimes: 5000,
            product: "005".to_string(),
            webhook: Some("https://partner.example.com/hook".to_string()),
        };
        assert!(request.validate().is_ok());

        let bad_webhook = InitiatePaymentRequest {
            webhook: Some("partner.example.com".to_string()),
            ..request
        };
        assert!(bad_webhook.validate().is_err());
    }

    #[test]
    fn test_confirm_validation() {
        let request = ConfirmLinkRequest {
            phone_number: "22123456".to_string(),
            session_id: "not-a-uuid".to_string(),
            otp: "123456".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_operation_id_is_added() {
        let id = Uuid::new_v4();
        let body = with_operation_id(json!({"success": true}), id);
        assert_eq!(body["operation_id"], id.to_string());
    }
}
