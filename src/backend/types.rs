//! Normalized upstream results and the typed payloads decoded from them

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Decoded JSON object returned by the backend
pub type Body = Map<String, Value>;

pub type BackendResult<T> = Result<Upstream<T>, UpstreamFailure>;

/// Failure codes carried in `UpstreamFailure::code`
pub mod codes {
    /// Upstream rejected the request (4xx, or 2xx with `success:false`)
    pub const REJECTED: i64 = 1;
    /// Upstream answered 5xx
    pub const SERVICE_UNAVAILABLE: i64 = 5;
    /// Transport or decoding fault
    pub const TRANSPORT: i64 = -1;
    pub const TIMEOUT: i64 = -2;
}

/// A successful call: the upstream status plus the decoded payload
#[derive(Debug, Clone)]
pub struct Upstream<T> {
    pub status_code: u16,
    pub data: T,
}

impl<T> Upstream<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Upstream<U> {
        Upstream {
            status_code: self.status_code,
            data: f(self.data),
        }
    }
}

impl Upstream<Body> {
    /// Flattened `{success:true, status_code, ...body}`, the shape passed
    /// back to partners untouched.
    pub fn into_json(self) -> Value {
        let mut body = self.data;
        body.insert("success".to_string(), Value::Bool(true));
        body.insert("status_code".to_string(), Value::from(self.status_code));
        Value::Object(body)
    }

    /// Decode the body into a typed payload. A body that does not match is
    /// a decoding fault, not a panic.
    pub fn decode<T: for<'de> Deserialize<'de>>(self) -> BackendResult<T> {
        let status_code = self.status_code;
        serde_json::from_value::<T>(Value::Object(self.data))
            .map(|data| Upstream { status_code, data })
            .map_err(|e| UpstreamFailure::transport(format!("unexpected upstream body: {}", e)))
    }
}

/// Every non-success outcome of an upstream call
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFailure {
    pub status_code: u16,
    pub code: i64,
    pub message: Option<String>,
    pub result: Option<Value>,
    pub non_field_errors: Option<Value>,
    /// Remaining body fields, kept for passthrough responses
    pub extra: Body,
}

impl UpstreamFailure {
    fn bare(status_code: u16, code: i64, message: Option<String>) -> Self {
        Self {
            status_code,
            code,
            message,
            result: None,
            non_field_errors: None,
            extra: Body::new(),
        }
    }

    pub fn timeout() -> Self {
        Self::bare(408, codes::TIMEOUT, Some("upstream timeout".to_string()))
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::bare(500, codes::TRANSPORT, Some(message.into()))
    }

    /// 5xx: the body is ignored, it may not even be JSON.
    pub fn service_unavailable(status_code: u16) -> Self {
        Self::bare(
            status_code,
            codes::SERVICE_UNAVAILABLE,
            Some("service unavailable".to_string()),
        )
    }

    /// Upstream said no. Known fields are lifted out, the rest is kept.
    pub fn rejected(status_code: u16, mut body: Body) -> Self {
        body.remove("success");
        body.remove("status_code");
        body.remove("code");

        let message = match body.remove("message") {
            Some(Value::String(message)) => Some(message),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        Self {
            status_code,
            code: codes::REJECTED,
            message,
            result: body.remove("result"),
            non_field_errors: body.remove("non_field_errors"),
            extra: body,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code == codes::TIMEOUT
    }

    /// Whether the upstream was never reached or never answered
    pub fn is_transport(&self) -> bool {
        self.code == codes::TIMEOUT || self.code == codes::TRANSPORT
    }

    /// What developer envelopes report under `result.error`
    pub fn error_value(&self) -> Value {
        match (&self.result, &self.message) {
            (Some(result), _) => result.clone(),
            (None, Some(message)) => Value::String(message.clone()),
            (None, None) => Value::Null,
        }
    }

    /// Flattened `{success:false, status_code, code, message, ...}`
    pub fn to_json(&self) -> Value {
        let mut body = self.extra.clone();
        body.insert("success".to_string(), Value::Bool(false));
        body.insert("status_code".to_string(), Value::from(self.status_code));
        body.insert("code".to_string(), Value::from(self.code));
        if let Some(message) = &self.message {
            body.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(result) = &self.result {
            body.insert("result".to_string(), result.clone());
        }
        if let Some(errors) = &self.non_field_errors {
            body.insert("non_field_errors".to_string(), errors.clone());
        }
        Value::Object(body)
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "upstream failure (status {}, code {}): {}",
            self.status_code,
            self.code,
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

impl std::error::Error for UpstreamFailure {}

/// Hosted payment page
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPage {
    #[serde(alias = "link")]
    pub url: String,
    pub payment_id: String,
}

/// Status of a hosted payment
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCheck {
    pub status: Option<String>,
}

/// Developer send-money status, shared by the send and check calls
#[derive(Debug, Clone, Deserialize)]
pub struct TransferStatus {
    pub status: Option<String>,
    pub transaction_id: Option<Value>,
}

/// OTP session opened by initiate-link-account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkSession {
    pub session_id: Option<String>,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub tracking_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkInitiation {
    #[serde(default)]
    pub body: LinkSession,
    pub message: Option<String>,
}

/// Account confirmed by a correct OTP
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfirmation {
    pub tracking_id: Uuid,
    pub message: Option<String>,
}

/// Split tender entry forwarded with a hosted payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    pub amount: i64,
    pub destination: String,
}

/// Everything the backend needs to open a hosted payment page
#[derive(Debug, Clone, Serialize)]
pub struct PaymentPageRequest {
    pub test_account: bool,
    pub accept_card: bool,
    pub accept_edinar: Option<bool>,
    pub amount_in_millimes: i64,
    pub currency: String,
    pub merchant_id: i64,
    pub app_token: Uuid,
    pub app_secret: Uuid,
    pub success_link: String,
    pub fail_link: String,
    pub developer_tracking_id: String,
    pub expires_at: i64,
    pub webhook_url: Option<String>,
    pub destination: Option<Vec<Destination>>,
    pub pre_authorization: bool,
}

/// One POS charge
#[derive(Debug, Clone, Serialize)]
pub struct PosTransactionRequest {
    pub merchant_id: i64,
    pub webhook: Option<String>,
    pub id_terminal: String,
    pub serial_number: String,
    pub service_code: String,
    pub amount_in_millimes: i64,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PosRefundRequest {
    pub merchant_id: i64,
    pub id_terminal: String,
    pub serial_number: String,
    pub reason: String,
    pub developer_tracking_id: Option<String>,
    pub flouci_transaction_id: Option<Uuid>,
}
