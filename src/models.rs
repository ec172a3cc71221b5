//! Persistent entities: applications, linked accounts and the partner transaction ledger

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    Verified,
    Unverified,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Verified => "VERIFIED",
            ApplicationStatus::Unverified => "UNVERIFIED",
        }
    }
}

impl TryFrom<String> for ApplicationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "VERIFIED" => Ok(ApplicationStatus::Verified),
            "UNVERIFIED" => Ok(ApplicationStatus::Unverified),
            other => Err(format!("unknown application status: {}", other)),
        }
    }
}

/// A registered integrator (developer app)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Application {
    pub id: i64,
    pub app_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub public_token: Uuid,
    #[serde(skip_serializing)]
    pub private_token: Uuid,
    /// Owning account; loosely coupled, not a foreign key
    pub tracking_id: Option<Uuid>,
    pub wallet: String,
    pub merchant_id: i64,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    pub active: bool,
    pub test: bool,
    pub deleted: bool,
    pub has_partner_access: bool,
    pub webhook: Option<String>,
    pub gross: BigDecimal,
    pub transaction_number: i64,
    pub revoke_number: i32,
    pub last_revoke_date: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl Application {
    /// Fresh, unverified application with a new credential pair; `id` is assigned on insert.
    pub fn new(name: impl Into<String>, wallet: impl Into<String>, merchant_id: i64) -> Self {
        Self {
            id: 0,
            app_id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            public_token: Uuid::new_v4(),
            private_token: Uuid::new_v4(),
            tracking_id: None,
            wallet: wallet.into(),
            merchant_id,
            status: ApplicationStatus::Unverified,
            active: true,
            test: false,
            deleted: false,
            has_partner_access: false,
            webhook: None,
            gross: BigDecimal::from(0),
            transaction_number: 0,
            revoke_number: 0,
            last_revoke_date: None,
            date_created: Utc::now(),
        }
    }

    /// Bearer value accepted by the credential layer
    pub fn bearer_token(&self) -> String {
        format!("{}:{}", self.public_token, self.private_token)
    }

    /// Usable for any credentialed call
    pub fn is_usable(&self) -> bool {
        self.active && !self.deleted
    }
}

/// Key issued to an internal service (`Api-Key <prefix>.<secret>`)
#[derive(Debug, Clone, FromRow)]
pub struct ServiceApiKey {
    pub id: i64,
    pub name: String,
    pub prefix: String,
    /// Hex SHA-256 of the full key
    pub hashed_key: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Confirmed binding between a phone number and an internal account for one merchant
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LinkedAccount {
    pub partner_tracking_id: Uuid,
    pub account_tracking_id: Uuid,
    pub phone_number: String,
    pub merchant_id: i64,
    pub is_active: bool,
    pub app_id: Option<i64>,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    P2p,
    Payment,
    Topup,
    Giftcard,
    BillPayment,
    DeveloperApi,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::P2p => "P2P",
            OperationType::Payment => "PAYMENT",
            OperationType::Topup => "TOPUP",
            OperationType::Giftcard => "GIFTCARD",
            OperationType::BillPayment => "BILL_PAYMENT",
            OperationType::DeveloperApi => "DEVELOPER_API",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P2P" => Ok(OperationType::P2p),
            "PAYMENT" => Ok(OperationType::Payment),
            "TOPUP" => Ok(OperationType::Topup),
            "GIFTCARD" => Ok(OperationType::Giftcard),
            "BILL_PAYMENT" => Ok(OperationType::BillPayment),
            "DEVELOPER_API" => Ok(OperationType::DeveloperApi),
            other => Err(format!("unknown operation type: {}", other)),
        }
    }
}

impl TryFrom<String> for OperationType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Ledger state. Only the first four take part in transitions here; the
/// rest belong to operation types served elsewhere and must stay decodable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    DataApiPending,
    Approved,
    Declined,
    WorkerPending,
    ServicePending,
    ServiceApproved,
    ServiceDeclined,
    RefundPending,
    RefundApproved,
    RefundDeclined,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::DataApiPending => "DATA_API_PENDING",
            OperationStatus::Approved => "APPROVED",
            OperationStatus::Declined => "DECLINED",
            OperationStatus::WorkerPending => "WORKER_PENDING",
            OperationStatus::ServicePending => "SERVICE_PENDING",
            OperationStatus::ServiceApproved => "SERVICE_APPROVED",
            OperationStatus::ServiceDeclined => "SERVICE_DECLINED",
            OperationStatus::RefundPending => "REFUND_PENDING",
            OperationStatus::RefundApproved => "REFUND_APPROVED",
            OperationStatus::RefundDeclined => "REFUND_DECLINED",
        }
    }

    /// Human label used in history listings
    pub fn label(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "Pending",
            OperationStatus::DataApiPending => "Data API Pending",
            OperationStatus::Approved => "Approved",
            OperationStatus::Declined => "Declined",
            OperationStatus::WorkerPending => "Worker Pending",
            OperationStatus::ServicePending => "Service Pending",
            OperationStatus::ServiceApproved => "Service Approved",
            OperationStatus::ServiceDeclined => "Service Declined",
            OperationStatus::RefundPending => "Refund Pending",
            OperationStatus::RefundApproved => "Refund Approved",
            OperationStatus::RefundDeclined => "Refund Declined",
        }
    }

    /// PENDING -> {DATA_API_PENDING, DECLINED}, DATA_API_PENDING -> {APPROVED, DECLINED}
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (OperationStatus::Pending, OperationStatus::DataApiPending)
                | (OperationStatus::Pending, OperationStatus::Declined)
                | (OperationStatus::DataApiPending, OperationStatus::Approved)
                | (OperationStatus::DataApiPending, OperationStatus::Declined)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Approved | OperationStatus::Declined)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "DATA_API_PENDING" => Ok(OperationStatus::DataApiPending),
            "APPROVED" => Ok(OperationStatus::Approved),
            "DECLINED" => Ok(OperationStatus::Declined),
            "WORKER_PENDING" => Ok(OperationStatus::WorkerPending),
            "SERVICE_PENDING" => Ok(OperationStatus::ServicePending),
            "SERVICE_APPROVED" => Ok(OperationStatus::ServiceApproved),
            "SERVICE_DECLINED" => Ok(OperationStatus::ServiceDeclined),
            "REFUND_PENDING" => Ok(OperationStatus::RefundPending),
            "REFUND_APPROVED" => Ok(OperationStatus::RefundApproved),
            "REFUND_DECLINED" => Ok(OperationStatus::RefundDeclined),
            other => Err(format!("unknown operation status: {}", other)),
        }
    }
}

impl TryFrom<String> for OperationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Structured view of `operation_payload`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationPayload {
    pub merchant_id: i64,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_sent: Option<bool>,
}

impl OperationPayload {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One money-movement request tracked through its lifecycle
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PartnerTransaction {
    pub operation_id: Uuid,
    #[sqlx(try_from = "String")]
    pub operation_type: OperationType,
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub amount_in_millimes: i64,
    pub operation_payload: Value,
    #[sqlx(try_from = "String")]
    pub operation_status: OperationStatus,
    pub blockchain_ref: Option<String>,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

impl PartnerTransaction {
    /// Tolerates legacy rows whose payload lacks some keys.
    pub fn payload(&self) -> OperationPayload {
        serde_json::from_value(self.operation_payload.clone()).unwrap_or_default()
    }
}

/// Fields needed to insert a new PENDING operation
#[derive(Debug, Clone)]
pub struct NewPartnerTransaction {
    pub operation_type: OperationType,
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub amount_in_millimes: i64,
    pub payload: OperationPayload,
}

/// History row joined with the counterpart phone numbers
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub operation_id: Uuid,
    #[sqlx(try_from = "String")]
    pub operation_type: OperationType,
    #[sqlx(try_from = "String")]
    pub operation_status: OperationStatus,
    pub operation_payload: Value,
    pub blockchain_ref: Option<String>,
    pub sender_phone: Option<String>,
    pub receiver_phone: Option<String>,
    pub time_created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OperationStatus; 11] = [
        OperationStatus::Pending,
        OperationStatus::DataApiPending,
        OperationStatus::Approved,
        OperationStatus::Declined,
        OperationStatus::WorkerPending,
        OperationStatus::ServicePending,
        OperationStatus::ServiceApproved,
        OperationStatus::ServiceDeclined,
        OperationStatus::RefundPending,
        OperationStatus::RefundApproved,
        OperationStatus::RefundDeclined,
    ];

    #[test]
    fn test_nothing_transitions_back_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(OperationStatus::Pending), "{}", from);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for to in ALL {
            assert!(!OperationStatus::Approved.can_transition_to(to));
            assert!(!OperationStatus::Declined.can_transition_to(to));
        }
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::DataApiPending));
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::Declined));
        assert!(OperationStatus::DataApiPending.can_transition_to(OperationStatus::Approved));
        assert!(OperationStatus::DataApiPending.can_transition_to(OperationStatus::Declined));
        assert!(!OperationStatus::Pending.can_transition_to(OperationStatus::Approved));
    }

    #[test]
    fn test_status_string_round_trip_covers_reserved_states() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert!("SETTLED".parse::<OperationStatus>().is_err());
    }

    #[test]
    fn test_payload_tolerates_missing_keys() {
        let tx = PartnerTransaction {
            operation_id: Uuid::new_v4(),
            operation_type: OperationType::Payment,
            sender_id: None,
            receiver_id: None,
            amount_in_millimes: 5000,
            operation_payload: serde_json::json!({"merchant_id": 111}),
            operation_status: OperationStatus::Pending,
            blockchain_ref: None,
            time_created: Utc::now(),
            time_modified: Utc::now(),
        };

        let payload = tx.payload();
        assert_eq!(payload.merchant_id, 111);
        assert!(payload.webhook.is_none());
    }
}
