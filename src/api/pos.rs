//! Point-of-sale endpoints for partner applications

use crate::api::envelope;
use crate::api::validation::{self, extract_validated_json, extract_validated_query, Validate};
use crate::api::AppState;
use crate::auth::PartnerApplication;
use crate::backend::types::{PosRefundRequest, PosTransactionRequest};
use crate::cache::throttle::{throttle_key, TRANSACTION_STATUS_SCOPE};
use crate::error::{AppError, DomainError, ValidationError};
use crate::services::sandbox;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_SERVICE_CODE: &str = "024";
pub const MIN_POS_AMOUNT: i64 = 1000;
pub const PAYMENT_METHODS: [&str; 4] = ["card", "wallet", "check", "nfc"];

pub(crate) fn default_service_code() -> String {
    DEFAULT_SERVICE_CODE.to_string()
}

pub(crate) fn default_payment_method() -> String {
    "card".to_string()
}

pub(crate) fn payment_method(field: &str, value: &str) -> Result<(), ValidationError> {
    if PAYMENT_METHODS.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: format!("\"{}\" is not a valid choice.", value),
        })
    }
}

fn non_field(message: &str) -> ValidationError {
    ValidationError::NonField {
        message: message.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSegment {
    pub amount_in_millimes: i64,
    pub payment_method: String,
    pub developer_tracking_id: String,
}

#[derive(Debug, Deserialize)]
pub struct InitPosRequest {
    pub id_terminal: String,
    pub serial_number: String,
    #[serde(default = "default_service_code")]
    pub service_code: String,
    #[serde(default)]
    pub is_multi_payment: bool,
    pub payment_segments: Option<Vec<PaymentSegment>>,
    pub amount_in_millimes: Option<i64>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub developer_tracking_id: Option<String>,
    pub webhook: Option<String>,
    pub parent_payment_id: Option<String>,
}

impl Validate for InitPosRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::max_len("id_terminal", &self.id_terminal, 16)?;
        validation::max_len("serial_number", &self.serial_number, 36)?;
        validation::max_len("service_code", &self.service_code, 3)?;
        if let Some(webhook) = &self.webhook {
            validation::http_url("webhook", webhook)?;
        }

        let single_shape =
            self.amount_in_millimes.is_some() || self.developer_tracking_id.is_some();

        if self.is_multi_payment {
            let segments = match &self.payment_segments {
                Some(segments) if !segments.is_empty() => segments,
                _ => {
                    return Err(non_field(
                        "payment_segments must be provided for multi-payment.",
                    ))
                }
            };
            if single_shape {
                return Err(non_field(
                    "Provide either payment_segments or a single payment, not both.",
                ));
            }
            for segment in segments {
                validation::range(
                    "payment_segments.amount_in_millimes",
                    segment.amount_in_millimes,
                    Some(MIN_POS_AMOUNT),
                    None,
                )?;
                payment_method("payment_segments.payment_method", &segment.payment_method)?;
                validation::max_len(
                    "payment_segments.developer_tracking_id",
                    &segment.developer_tracking_id,
                    60,
                )?;
            }
            return Ok(());
        }

        if self.payment_segments.is_some() {
            return Err(non_field(
                "Provide either payment_segments or a single payment, not both.",
            ));
        }

        let mut missing = Vec::new();
        if self.amount_in_millimes.is_none() {
            missing.push("amount_in_millimes");
        }
        if self.developer_tracking_id.as_deref().is_none_or(str::is_empty) {
            missing.push("developer_tracking_id");
        }
        if !missing.is_empty() {
            return Err(non_field(&format!(
                "Missing required fields for single payment: {}",
                missing.join(", ")
            )));
        }

        if let Some(amount) = self.amount_in_millimes {
            validation::range("amount_in_millimes", amount, Some(MIN_POS_AMOUNT), None)?;
        }
        payment_method("payment_method", &self.payment_method)?;
        if let Some(tracking_id) = &self.developer_tracking_id {
            validation::max_len("developer_tracking_id", tracking_id, 60)?;
        }
        Ok(())
    }
}

impl InitPosRequest {
    fn charge(
        &self,
        merchant_id: i64,
        amount_in_millimes: i64,
        payment_method: &str,
        developer_tracking_id: &str,
        parent_payment_id: Option<String>,
    ) -> PosTransactionRequest {
        PosTransactionRequest {
            merchant_id,
            webhook: self.webhook.clone(),
            id_terminal: self.id_terminal.clone(),
            serial_number: self.serial_number.clone(),
            service_code: self.service_code.clone(),
            amount_in_millimes,
            payment_method: payment_method.to_string(),
            developer_tracking_id: Some(developer_tracking_id.to_string()),
            parent_payment_id,
        }
    }

    fn single_charge(&self, merchant_id: i64) -> PosTransactionRequest {
        self.charge(
            merchant_id,
            self.amount_in_millimes.unwrap_or_default(),
            &self.payment_method,
            self.developer_tracking_id.as_deref().unwrap_or_default(),
            None,
        )
    }

    /// One charge per segment, all under the same parent payment
    fn segment_charges(&self, merchant_id: i64) -> Vec<PosTransactionRequest> {
        self.payment_segments
            .iter()
            .flatten()
            .map(|s| {
                self.charge(
                    merchant_id,
                    s.amount_in_millimes,
                    &s.payment_method,
                    &s.developer_tracking_id,
                    self.parent_payment_id.clone(),
                )
            })
            .collect()
    }
}

pub async fn init_pos_transaction(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<InitPosRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;
    let merchant_id = application.merchant_id;

    if !request.is_multi_payment {
        info!(merchant_id, id_terminal = %request.id_terminal, "initiating POS transaction");
        let result = state
            .backend
            .generate_pos_transaction(&request.single_charge(merchant_id))
            .await;
        return Ok(envelope::passthrough(result));
    }

    let charges = request.segment_charges(merchant_id);
    info!(
        merchant_id,
        id_terminal = %request.id_terminal,
        segments = charges.len(),
        "initiating multi-payment POS transaction"
    );

    let results = join_all(
        charges
            .iter()
            .map(|charge| state.backend.generate_pos_transaction(charge)),
    )
    .await;
    let bodies: Vec<Value> = results
        .into_iter()
        .map(|result| envelope::flatten(result).1)
        .collect();

    Ok((StatusCode::CREATED, Json(bodies)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PosStatusQuery {
    pub developer_tracking_id: Option<String>,
    pub flouci_transaction_id: Option<String>,
}

impl Validate for PosStatusQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(tracking_id) = &self.developer_tracking_id {
            validation::max_len("developer_tracking_id", tracking_id, 60)?;
        }
        if let Some(transaction_id) = &self.flouci_transaction_id {
            validation::uuid("flouci_transaction_id", transaction_id)?;
        }
        if self.developer_tracking_id.is_none() && self.flouci_transaction_id.is_none() {
            return Err(non_field(
                "Provide either 'flouci_transaction_id' or 'developer_tracking_id'.",
            ));
        }
        Ok(())
    }
}

pub async fn fetch_pos_transaction_status(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    query: Result<Query<PosStatusQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_validated_query(query)?;
    let merchant_id = application.merchant_id;

    if let Some(key) = throttle_key(
        TRANSACTION_STATUS_SCOPE,
        merchant_id,
        &[
            query.developer_tracking_id.as_deref(),
            query.flouci_transaction_id.as_deref(),
        ],
    ) {
        let window = state.gateway.pos_status_throttle;
        match state.throttle.allow(&key, window).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(merchant_id, "POS status request throttled");
                return Err(DomainError::Throttled {
                    retry_after_secs: window.as_secs(),
                }
                .into());
            }
            Err(e) => warn!(merchant_id, "throttle unavailable, letting request through: {}", e),
        }
    }

    if !state.gateway.is_production() {
        if let Some(fixture) = query
            .developer_tracking_id
            .as_deref()
            .and_then(sandbox::pos_status)
        {
            return Ok(Json(fixture).into_response());
        }
    }

    let flouci_transaction_id = query
        .flouci_transaction_id
        .as_deref()
        .map(|id| validation::uuid("flouci_transaction_id", id))
        .transpose()?;

    let result = state
        .backend
        .fetch_associated_partner_transaction(
            merchant_id,
            query.developer_tracking_id.as_deref(),
            flouci_transaction_id,
        )
        .await;
    Ok(envelope::passthrough(result))
}

#[derive(Debug, Deserialize)]
pub struct CancelPosRequest {
    pub id_terminal: String,
    pub serial_number: String,
    pub reason: String,
    pub developer_tracking_id: Option<String>,
    pub flouci_transaction_id: Option<String>,
}

impl Validate for CancelPosRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::max_len("id_terminal", &self.id_terminal, 16)?;
        validation::max_len("serial_number", &self.serial_number, 36)?;
        if let Some(tracking_id) = &self.developer_tracking_id {
            validation::max_len("developer_tracking_id", tracking_id, 60)?;
        }
        if let Some(transaction_id) = &self.flouci_transaction_id {
            validation::uuid("flouci_transaction_id", transaction_id)?;
        }
        if self.developer_tracking_id.is_none() && self.flouci_transaction_id.is_none() {
            return Err(non_field(
                "Provide either 'flouci_transaction_id' or 'developer_tracking_id'.",
            ));
        }
        Ok(())
    }
}

pub async fn cancel_pos_transaction(
    State(state): State<AppState>,
    PartnerApplication(application): PartnerApplication,
    body: Result<Json<CancelPosRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = extract_validated_json(body)?;

    if !state.gateway.is_production() {
        if let Some((status_code, fixture)) = request
            .developer_tracking_id
            .as_deref()
            .and_then(sandbox::pos_cancel)
        {
            return Ok((envelope::status(status_code), Json(fixture)).into_response());
        }
    }

    let flouci_transaction_id = request
        .flouci_transaction_id
        .as_deref()
        .map(|id| validation::uuid("flouci_transaction_id", id))
        .transpose()?;

    info!(
        merchant_id = application.merchant_id,
        id_terminal = %request.id_terminal,
        "refunding POS transaction"
    );

    let result = state
        .backend
        .refund_pos_transaction(&PosRefundRequest {
            merchant_id: application.merchant_id,
            id_terminal: request.id_terminal,
            serial_number: request.serial_number,
            reason: request.reason,
            developer_tracking_id: request.developer_tracking_id,
            flouci_transaction_id,
        })
        .await;
    Ok(envelope::passthrough(result))
}
