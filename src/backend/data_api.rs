//! Token-authenticated client for the data API, which settles wallet payments
//! accepted with a Flouci OTP.

use crate::config::DataApiConfig;
use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// The data API counts in drops: 1 millime = 100 drops.
pub const DROPS_PER_MILLIME: i64 = 100;

/// `None` when the amount does not fit once converted
pub fn millimes_to_drops(millimes: i64) -> Option<i64> {
    millimes.checked_mul(DROPS_PER_MILLIME)
}

pub fn drops_to_millimes(drops: i64) -> i64 {
    drops / DROPS_PER_MILLIME
}

#[derive(Debug, thiserror::Error)]
pub enum DataApiError {
    #[error("data API authentication failed: {0}")]
    Authentication(String),

    #[error("data API request timed out")]
    Timeout,

    #[error("data API request failed: {0}")]
    Transport(String),

    #[error("amount {0} cannot be expressed in drops")]
    AmountOutOfRange(i64),
}

impl From<reqwest::Error> for DataApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataApiError::Timeout
        } else {
            DataApiError::Transport(err.to_string())
        }
    }
}

impl From<DataApiError> for AppError {
    fn from(err: DataApiError) -> Self {
        match err {
            DataApiError::AmountOutOfRange(_) => ValidationError::OutOfRange {
                field: "amount".to_string(),
                min: Some(1),
                max: Some(i64::MAX / DROPS_PER_MILLIME),
            }
            .into(),
            other => AppError::new(AppErrorKind::External(ExternalError::ConnectionIssue {
                service: "data_api".to_string(),
                message: other.to_string(),
            })),
        }
    }
}

/// Payment acceptance request, amounts in millimes
#[derive(Debug, Clone)]
pub struct AcceptPaymentRequest {
    pub flouci_otp: String,
    pub app_token: Uuid,
    pub payment_id: String,
    pub amount_in_millimes: i64,
    pub destination: Option<String>,
    pub developer_tracking_id: Option<String>,
    pub app_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AcceptStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AcceptResult {
    pub status: AcceptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Value>,
}

/// `{result, code, message?}` returned to the developer as-is
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AcceptOutcome {
    pub result: AcceptResult,
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AcceptOutcome {
    /// Bare status, as served to sandbox applications
    pub fn bare(status: AcceptStatus) -> Self {
        Self {
            result: AcceptResult {
                status,
                amount: None,
                sender: None,
                transaction_id: None,
            },
            code: 0,
            message: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

pub struct DataApiClient {
    client: Client,
    config: DataApiConfig,
    token: RwLock<Option<String>>,
}

impl DataApiClient {
    pub fn new(config: &DataApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config: config.clone(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn authenticate(&self) -> Result<String, DataApiError> {
        let response = self
            .client
            .post(self.url("/api/authenticate"))
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
                "remember_me": 1,
            }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(DataApiError::Authentication(format!("status {}", status)));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| DataApiError::Authentication(e.to_string()))?
            .id_token;

        info!("data API token refreshed");
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn current_token(&self) -> Result<String, DataApiError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    /// POST with the cached token, re-authenticating once on 401.
    async fn post_authenticated(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(StatusCode, Value), DataApiError> {
        let mut token = self.current_token().await?;

        for attempt in 0..2 {
            let response = self
                .client
                .post(self.url(path))
                .bearer_auth(&token)
                .json(body)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!(path, "data API token rejected, re-authenticating");
                *self.token.write().await = None;
                token = self.authenticate().await?;
                continue;
            }

            let status = response.status();
            let text = response.text().await?;
            let value = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Ok((status, value));
        }

        Err(DataApiError::Authentication(
            "token rejected after refresh".to_string(),
        ))
    }

    /// Settle a payment. Succeeds only on HTTP 200 with `code == 0`; any other
    /// answer becomes a FAILED outcome carrying the upstream code and message.
    pub async fn accept_payment(
        &self,
        request: &AcceptPaymentRequest,
    ) -> Result<AcceptOutcome, DataApiError> {
        let amount = millimes_to_drops(request.amount_in_millimes)
            .ok_or(DataApiError::AmountOutOfRange(request.amount_in_millimes))?;
        let body = json!({
            "code": request.flouci_otp,
            "appToken": request.app_token,
            "id": request.payment_id,
            "amount": amount,
            "destination": request.destination,
            "developerTrackingId": request.developer_tracking_id,
            "appId": request.app_id,
        });

        let (status, response) = self.post_authenticated("/api/developer/accept", &body).await?;
        let code = response.get("code").and_then(Value::as_i64);

        if status == StatusCode::OK && code == Some(0) {
            let result = response.get("result").cloned().unwrap_or(Value::Null);
            return Ok(AcceptOutcome {
                result: AcceptResult {
                    status: AcceptStatus::Success,
                    amount: result.get("amount").and_then(Value::as_i64).map(drops_to_millimes),
                    sender: result.get("account").cloned(),
                    transaction_id: result.get("hash").cloned(),
                },
                code: 0,
                message: None,
            });
        }

        warn!(
            payment_id = %request.payment_id,
            status_code = status.as_u16(),
            "data API refused payment"
        );
        Ok(AcceptOutcome {
            result: AcceptResult {
                status: AcceptStatus::Failed,
                amount: None,
                sender: None,
                transaction_id: None,
            },
            code: code.unwrap_or(1),
            message: Some(
                response
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Payment failed")
                    .to_string(),
            ),
        })
    }
}
