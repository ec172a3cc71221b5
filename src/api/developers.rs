//! Developer payment endpoints.
//!
//! Every flow has one core handler taking an [`ApiVersion`]; the `_v1` and
//! `_v2` wrappers only pick where credentials are read from.

use crate::api::envelope::{self, Envelope, CHECK_SEND_MONEY_STATUS, DEVELOPERS};
use crate::api::pos::{self, MIN_POS_AMOUNT};
use crate::api::validation::{self, extract_validated_json, Validate};
use crate::api::AppState;
use crate::auth::credentials::resolve_versioned;
use crate::auth::{ApiVersion, AppCredentials, ResolvedApplication};
use crate::backend::data_api::{AcceptOutcome, AcceptPaymentRequest, AcceptStatus};
use crate::backend::types::{Destination, PaymentPageRequest, PosTransactionRequest};
use crate::backend::UpstreamFailure;
use crate::error::{AppError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::models::Application;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_AMOUNT: i64 = 100;
pub const MAX_AMOUNT: i64 = 2_000_000;
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 1200;
pub const CURRENCIES: [&str; 3] = ["TND", "EUR", "USD"];

/// Sandbox OTPs answered locally for test applications
pub const TEST_OTP_SUCCESS: &str = "F-111111";
pub const TEST_OTP_FAILURE: &str = "F-000000";

const TEST_APP_SEND_MONEY: &str = "Can't send money through test App";

async fn caller(
    state: &AppState,
    version: ApiVersion,
    headers: &HeaderMap,
    credentials: &AppCredentials,
) -> Result<Application, AppError> {
    resolve_versioned(state.applications.as_ref(), version, headers, credentials)
        .await
        .map_err(|err| match get_request_id_from_headers(headers) {
            Some(request_id) => err.with_request_id(request_id),
            None => err,
        })
}

/// v1 credentials carried in a raw body. Anything unreadable counts as absent.
fn body_credentials(body: &Value) -> AppCredentials {
    AppCredentials::deserialize(body).unwrap_or_default()
}

/// Resolve the caller first, then decode and validate the typed request.
/// v2 reads the bearer header; v1 reads `app_token`/`app_secret` out of the
/// raw body, so a missing credential is a 403 even when the body is malformed.
async fn authenticated_request<T: DeserializeOwned + Validate>(
    state: &AppState,
    version: ApiVersion,
    headers: &HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(Application, T), AppError> {
    let body = body.map(|Json(value)| value);
    let credentials = match (version, &body) {
        (ApiVersion::V1, Ok(value)) => body_credentials(value),
        _ => AppCredentials::default(),
    };
    let application = caller(state, version, headers, &credentials).await?;

    let value = body.map_err(|err| ValidationError::InvalidBody {
        message: err.body_text(),
    })?;
    let request = T::deserialize(value).map_err(|err| ValidationError::InvalidBody {
        message: err.to_string(),
    })?;
    request.validate()?;
    Ok((application, request))
}

fn default_session_timeout() -> i64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_currency() -> String {
    "TND".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GeneratePaymentRequest {
    pub amount: i64,
    pub accept_card: bool,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: i64,
    pub success_link: String,
    pub fail_link: String,
    pub developer_tracking_id: String,
    pub accept_edinar: Option<bool>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub webhook: Option<String>,
    pub destination: Option<Vec<Destination>>,
    #[serde(default)]
    pub pre_authorization: bool,
}

impl Validate for GeneratePaymentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::range("amount", self.amount, Some(MIN_AMOUNT), Some(MAX_AMOUNT))?;
        validation::range("session_timeout_secs", self.session_timeout_secs, Some(1), None)?;
        validation::http_url("success_link", &self.success_link)?;
        validation::http_url("fail_link", &self.fail_link)?;
        validation::len_between("developer_tracking_id", &self.developer_tracking_id, 1, 50)?;
        if !CURRENCIES.contains(&self.currency.as_str()) {
            return Err(ValidationError::InvalidField {
                field: "currency".to_string(),
                reason: format!("\"{}\" is not a valid choice.", self.currency),
            });
        }
        if let Some(webhook) = &self.webhook {
            validation::http_url("webhook", webhook)?;
        }
        for split in self.destination.iter().flatten() {
            validation::range("destination.amount", split.amount, Some(1), None)?;
            validation::max_len("destination.destination", &split.destination, 255)?;
        }
        Ok(())
    }
}

async fn generate_payment(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let (application, request): (_, GeneratePaymentRequest) =
        authenticated_request(&state, version, &headers, body).await?;

    let page = PaymentPageRequest {
        test_account: application.test,
        accept_card: request.accept_card,
        accept_edinar: request.accept_edinar,
        amount_in_millimes: request.amount,
        currency: request.currency,
        merchant_id: application.merchant_id,
        app_token: application.public_token,
        app_secret: application.private_token,
        success_link: request.success_link,
        fail_link: request.fail_link,
        developer_tracking_id: request.developer_tracking_id.clone(),
        expires_at: request.session_timeout_secs,
        webhook_url: request.webhook,
        destination: request.destination,
        pre_authorization: request.pre_authorization,
    };

    let service_version = &state.gateway.service_version;
    let response = match state.backend.generate_payment_page(&page).await {
        Ok(upstream) => {
            info!(
                app_id = %application.app_id,
                version = version.as_str(),
                payment_id = %upstream.data.payment_id,
                "payment page generated"
            );
            Envelope::success(
                DEVELOPERS,
                service_version,
                json!({
                    "link": upstream.data.url,
                    "payment_id": upstream.data.payment_id,
                    "developer_tracking_id": request.developer_tracking_id,
                    "success": true,
                }),
            )
            .into_response_with(upstream.status_code)
        }
        Err(failure) => failure_response(DEVELOPERS, service_version, &failure),
    };

    Ok(response)
}

fn failure_response(name: &'static str, version: &str, failure: &UpstreamFailure) -> Response {
    warn!(
        status_code = failure.status_code,
        code = failure.code,
        "{} call failed upstream",
        name
    );
    Envelope::failure(name, version, failure).into_response_with(failure.status_code)
}

pub async fn generate_payment_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    generate_payment(state, ApiVersion::V1, headers, body).await
}

pub async fn generate_payment_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    generate_payment(state, ApiVersion::V2, headers, body).await
}

async fn verify_payment(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    payment_id: String,
    query: Result<Query<AppCredentials>, QueryRejection>,
) -> Result<Response, AppError> {
    // A query that does not decode has no usable credentials.
    let credentials = match version {
        ApiVersion::V1 => query.map(|Query(c)| c).unwrap_or_default(),
        ApiVersion::V2 => AppCredentials::default(),
    };
    let application = caller(&state, version, &headers, &credentials).await?;
    validation::max_len("payment_id", &payment_id, 100)?;

    let service_version = &state.gateway.service_version;
    let response = match state
        .backend
        .check_payment(&payment_id, &application.wallet, application.merchant_id)
        .await
    {
        Ok(upstream) => Envelope::success(
            DEVELOPERS,
            service_version,
            json!({
                "payment_status": upstream.data.status,
                "payment_id": payment_id,
                "success": true,
            }),
        )
        .into_response_with(upstream.status_code),
        Err(failure) => failure_response(DEVELOPERS, service_version, &failure),
    };

    Ok(response)
}

pub async fn verify_payment_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    query: Result<Query<AppCredentials>, QueryRejection>,
) -> Result<Response, AppError> {
    verify_payment(state, ApiVersion::V1, headers, payment_id, query).await
}

pub async fn verify_payment_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    query: Result<Query<AppCredentials>, QueryRejection>,
) -> Result<Response, AppError> {
    verify_payment(state, ApiVersion::V2, headers, payment_id, query).await
}

#[derive(Debug, Deserialize)]
pub struct SendMoneyRequest {
    pub amount: i64,
    pub destination: String,
    pub webhook: String,
}

impl Validate for SendMoneyRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::range("amount", self.amount, Some(MIN_AMOUNT), Some(MAX_AMOUNT))?;
        validation::max_len("destination", &self.destination, 35)?;
        validation::http_url("webhook", &self.webhook)
    }
}

async fn send_money(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let (application, request): (_, SendMoneyRequest) =
        authenticated_request(&state, version, &headers, body).await?;

    let service_version = &state.gateway.service_version;
    if application.test {
        warn!(app_id = %application.app_id, "send money refused for test application");
        return Ok(Envelope {
            result: json!({ "success": false, "error": TEST_APP_SEND_MONEY, "details": null }),
            name: DEVELOPERS,
            code: 1,
            version: service_version.clone(),
            message: None,
        }
        .into_response_with(StatusCode::NOT_ACCEPTABLE.as_u16()));
    }

    let response = match state
        .backend
        .developer_send_money(
            request.amount,
            &request.destination,
            &request.webhook,
            &application.wallet,
        )
        .await
    {
        Ok(upstream) => Envelope::success(
            DEVELOPERS,
            service_version,
            json!({
                "transaction_status": upstream.data.status,
                "transaction_id": upstream.data.transaction_id,
                "success": true,
            }),
        )
        .into_response_with(upstream.status_code),
        Err(failure) => failure_response(DEVELOPERS, service_version, &failure),
    };

    Ok(response)
}

pub async fn send_money_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    send_money(state, ApiVersion::V1, headers, body).await
}

pub async fn send_money_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    send_money(state, ApiVersion::V2, headers, body).await
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckStatusQuery {
    pub operation_id: Option<String>,
    pub app_token: Option<String>,
    pub app_secret: Option<String>,
}

impl CheckStatusQuery {
    fn credentials(&self) -> AppCredentials {
        let parse = |value: &Option<String>| {
            value.as_deref().and_then(|v| Uuid::parse_str(v).ok())
        };
        AppCredentials {
            app_token: parse(&self.app_token),
            app_secret: parse(&self.app_secret),
        }
    }
}

async fn check_send_money_status(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    query: Result<Query<CheckStatusQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = query
        .map(|Query(q)| q)
        .map_err(|err| ValidationError::InvalidBody {
            message: err.body_text(),
        })?;
    let application = caller(&state, version, &headers, &query.credentials()).await?;
    let operation_id = validation::required(&query.operation_id, "operation_id")?;
    let operation_id = validation::uuid("operation_id", operation_id)?;

    let service_version = &state.gateway.service_version;
    let result = state
        .backend
        .developer_check_send_money_status(operation_id, application.merchant_id)
        .await;

    let response = match result {
        Ok(upstream) => {
            let reason = envelope::status(upstream.status_code)
                .canonical_reason()
                .unwrap_or_default();
            Envelope::success(
                CHECK_SEND_MONEY_STATUS,
                service_version,
                json!({
                    "transaction_status": upstream.data.status,
                    "transaction_id": upstream.data.transaction_id,
                    "success": true,
                }),
            )
            .with_message(reason)
            .into_response_with(upstream.status_code)
        }
        Err(failure) => {
            let reason = envelope::status(failure.status_code)
                .canonical_reason()
                .unwrap_or_default();
            Envelope::failure(CHECK_SEND_MONEY_STATUS, service_version, &failure)
                .with_message(reason)
                .into_response_with(failure.status_code)
        }
    };

    Ok(response)
}

pub async fn check_send_money_status_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CheckStatusQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    check_send_money_status(state, ApiVersion::V1, headers, query).await
}

pub async fn check_send_money_status_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CheckStatusQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    check_send_money_status(state, ApiVersion::V2, headers, query).await
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub flouci_otp: String,
    pub payment_id: String,
    pub app_id: Option<Uuid>,
    pub amount: i64,
    pub destination: Option<String>,
    pub developer_tracking_id: Option<String>,
}

impl Validate for AcceptRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::range("amount", self.amount, Some(1), Some(MAX_AMOUNT))?;
        if let Some(destination) = &self.destination {
            validation::max_len("destination", destination, 40)?;
        }
        if let Some(tracking_id) = &self.developer_tracking_id {
            validation::max_len("developer_tracking_id", tracking_id, 40)?;
        }
        Ok(())
    }
}

/// Test applications settle locally on the two sandbox OTPs.
fn sandbox_accept(application: &Application, otp: &str) -> Option<AcceptOutcome> {
    if !application.test {
        return None;
    }
    match otp {
        TEST_OTP_SUCCESS => Some(AcceptOutcome::bare(AcceptStatus::Success)),
        TEST_OTP_FAILURE => Some(AcceptOutcome::bare(AcceptStatus::Failed)),
        _ => None,
    }
}

async fn accept(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let (application, request): (_, AcceptRequest) =
        authenticated_request(&state, version, &headers, body).await?;

    if let Some(outcome) = sandbox_accept(&application, &request.flouci_otp) {
        info!(app_id = %application.app_id, status = ?outcome.result.status, "sandbox accept");
        return Ok(Json(outcome).into_response());
    }

    // The app's own identity and wallet always win over the request body.
    let accept = AcceptPaymentRequest {
        flouci_otp: request.flouci_otp,
        app_token: application.public_token,
        payment_id: request.payment_id,
        amount_in_millimes: request.amount,
        destination: Some(application.wallet.clone()),
        developer_tracking_id: request.developer_tracking_id,
        app_id: Some(application.app_id),
    };

    let outcome = state.data_api.accept_payment(&accept).await?;
    Ok(Json(outcome).into_response())
}

pub async fn accept_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    accept(state, ApiVersion::V1, headers, body).await
}

pub async fn accept_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    accept(state, ApiVersion::V2, headers, body).await
}

/// A single POS charge pushed by a developer application
#[derive(Debug, Deserialize)]
pub struct AddPosTransactionRequest {
    pub webhook_url: Option<String>,
    pub id_terminal: String,
    pub serial_number: String,
    #[serde(default = "pos::default_service_code")]
    pub service_code: String,
    pub amount_in_millimes: i64,
    #[serde(default = "pos::default_payment_method")]
    pub payment_method: String,
}

impl Validate for AddPosTransactionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::max_len("id_terminal", &self.id_terminal, 16)?;
        validation::max_len("serial_number", &self.serial_number, 36)?;
        validation::max_len("service_code", &self.service_code, 3)?;
        validation::range(
            "amount_in_millimes",
            self.amount_in_millimes,
            Some(MIN_POS_AMOUNT),
            Some(MAX_AMOUNT),
        )?;
        pos::payment_method("payment_method", &self.payment_method)?;
        if let Some(webhook_url) = &self.webhook_url {
            validation::http_url("webhook_url", webhook_url)?;
        }
        Ok(())
    }
}

async fn add_pos_transaction(
    state: AppState,
    version: ApiVersion,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let (application, request): (_, AddPosTransactionRequest) =
        authenticated_request(&state, version, &headers, body).await?;

    info!(
        app_id = %application.app_id,
        version = version.as_str(),
        id_terminal = %request.id_terminal,
        "developer POS transaction"
    );
    let charge = PosTransactionRequest {
        merchant_id: application.merchant_id,
        webhook: request.webhook_url,
        id_terminal: request.id_terminal,
        serial_number: request.serial_number,
        service_code: request.service_code,
        amount_in_millimes: request.amount_in_millimes,
        payment_method: request.payment_method,
        developer_tracking_id: None,
        parent_payment_id: None,
    };
    let result = state.backend.generate_pos_transaction(&charge).await;
    Ok(envelope::passthrough(result))
}

pub async fn add_pos_transaction_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    add_pos_transaction(state, ApiVersion::V1, headers, body).await
}

pub async fn add_pos_transaction_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    add_pos_transaction(state, ApiVersion::V2, headers, body).await
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPreAuthorizationRequest {
    pub payment_id: String,
    pub amount: i64,
}

impl Validate for ConfirmPreAuthorizationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::max_len("payment_id", &self.payment_id, 100)?;
        validation::range("amount", self.amount, Some(1), None)
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelPreAuthorizationRequest {
    pub payment_id: String,
}

impl Validate for CancelPreAuthorizationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::max_len("payment_id", &self.payment_id, 100)
    }
}

fn pre_authorization_response(
    version: &str,
    result: crate::backend::BackendResult<crate::backend::Body>,
) -> Response {
    match result {
        Ok(upstream) => {
            let status_code = upstream.status_code;
            Envelope::success(DEVELOPERS, version, upstream.into_json())
                .into_response_with(status_code)
        }
        Err(failure) => failure_response(DEVELOPERS, version, &failure),
    }
}

pub async fn confirm_pre_authorization(
    State(state): State<AppState>,
    ResolvedApplication(application): ResolvedApplication,
    body: Result<Json<ConfirmPreAuthorizationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let result = state
        .backend
        .confirm_pre_authorization(&request.payment_id, request.amount, application.merchant_id)
        .await;
    Ok(pre_authorization_response(&state.gateway.service_version, result))
}

pub async fn cancel_pre_authorization(
    State(state): State<AppState>,
    ResolvedApplication(application): ResolvedApplication,
    body: Result<Json<CancelPreAuthorizationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let result = state
        .backend
        .cancel_pre_authorization(&request.payment_id, application.merchant_id)
        .await;
    Ok(pre_authorization_response(&state.gateway.service_version, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_request() -> GeneratePaymentRequest {
        serde_json::from_value(json!({
            "amount": 1500,
            "accept_card": true,
            "success_link": "https://shop.example.com/ok",
            "fail_link": "https://shop.example.com/ko",
            "developer_tracking_id": "order-42",
        }))
        .unwrap()
    }

    #[test]
    fn test_generate_defaults() {
        let request = generate_request();
        assert_eq!(request.session_timeout_secs, DEFAULT_SESSION_TIMEOUT_SECS);
        assert_eq!(request.currency, "TND");
        assert!(!request.pre_authorization);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_generate_bounds() {
        let mut request = generate_request();
        request.amount = 2_000_001;
        assert!(request.validate().is_err());

        let mut request = generate_request();
        request.currency = "GBP".to_string();
        assert!(request.validate().is_err());

        let mut request = generate_request();
        request.destination = Some(vec![Destination {
            amount: 0,
            destination: "wallet".to_string(),
        }]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_v1_credentials_read_from_raw_body() {
        let token = Uuid::new_v4();
        let secret = Uuid::new_v4();
        let body = json!({
            "app_token": token,
            "app_secret": secret,
            "amount": 1000,
            "destination": "22123456",
            "webhook": "https://dev.example.com/hook",
        });

        let credentials = body_credentials(&body);
        assert_eq!(credentials.app_token, Some(token));
        assert_eq!(credentials.app_secret, Some(secret));

        let request = SendMoneyRequest::deserialize(body).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unreadable_body_credentials_are_absent() {
        let credentials = body_credentials(&json!({"app_token": "not-a-uuid"}));
        assert!(credentials.app_token.is_none());
        assert!(body_credentials(&json!([1, 2])).app_secret.is_none());
    }

    #[test]
    fn test_accept_amount_bounds() {
        let request = |amount: i64| AcceptRequest {
            flouci_otp: "123456".to_string(),
            payment_id: "p-1".to_string(),
            app_id: None,
            amount,
            destination: None,
            developer_tracking_id: None,
        };
        assert!(request(1500).validate().is_ok());
        assert!(request(0).validate().is_err());
        assert!(request(i64::MAX / 10).validate().is_err());
    }

    #[test]
    fn test_sandbox_accept_only_for_test_apps() {
        let mut app = Application::new("sandbox", "wallet", 111);
        assert!(sandbox_accept(&app, TEST_OTP_SUCCESS).is_none());

        app.test = true;
        assert_eq!(
            sandbox_accept(&app, TEST_OTP_SUCCESS).unwrap().result.status,
            AcceptStatus::Success
        );
        assert_eq!(
            sandbox_accept(&app, TEST_OTP_FAILURE).unwrap().result.status,
            AcceptStatus::Failed
        );
        assert!(sandbox_accept(&app, "F-123456").is_none());
    }
}
