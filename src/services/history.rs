//! Paginated operation history for one linked account

use crate::database::repository::{HistoryFilter, PartnerTransactionRepository};
use crate::error::{AppResult, ValidationError};
use crate::models::{HistoryRow, OperationStatus, OperationType};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_REQUESTED_SIZE: u32 = 10_000;
/// Pages never hold more than this many rows, whatever `size` asks for
pub const MAX_PAGE_SIZE: u32 = 100;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Raw history query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub operation_type: Option<String>,
    pub operation_status: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| ValidationError::InvalidField {
            field: field.to_string(),
            reason: "expected format YYYY-MM-DDThh:mm:ssZ".to_string(),
        })
}

impl HistoryParams {
    /// Apply defaults and bounds: today 00:00 UTC to now, APPROVED, page 1, 10 rows.
    pub fn into_filter(
        self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<HistoryFilter, ValidationError> {
        let from_date = match self.from_date.as_deref() {
            Some(value) => parse_date("from_date", value)?,
            None => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| Utc.from_utc_datetime(&midnight))
                .unwrap_or(now),
        };
        let to_date = match self.to_date.as_deref() {
            Some(value) => parse_date("to_date", value)?,
            None => now,
        };

        let operation_type = self
            .operation_type
            .as_deref()
            .map(str::parse::<OperationType>)
            .transpose()
            .map_err(|reason| ValidationError::InvalidField {
                field: "operation_type".to_string(),
                reason,
            })?;
        let operation_status = self
            .operation_status
            .as_deref()
            .map(str::parse::<OperationStatus>)
            .transpose()
            .map_err(|reason| ValidationError::InvalidField {
                field: "operation_status".to_string(),
                reason,
            })?
            .unwrap_or(OperationStatus::Approved);

        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ValidationError::OutOfRange {
                field: "page".to_string(),
                min: Some(1),
                max: None,
            });
        }

        let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_REQUESTED_SIZE).contains(&size) {
            return Err(ValidationError::OutOfRange {
                field: "size".to_string(),
                min: Some(1),
                max: Some(i64::from(MAX_REQUESTED_SIZE)),
            });
        }

        Ok(HistoryFilter {
            account_id,
            from_date,
            to_date,
            operation_type,
            operation_status,
            page,
            size: size.min(MAX_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryPayload {
    pub blockchain_ref: Option<String>,
    pub operation_type: OperationType,
    pub product: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub operation_id: Uuid,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub status: &'static str,
    pub time_created: DateTime<Utc>,
    pub payload: HistoryPayload,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        let product = row
            .operation_payload
            .get("product")
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string();

        Self {
            operation_id: row.operation_id,
            sender: row.sender_phone,
            receiver: row.receiver_phone,
            status: row.operation_status.label(),
            time_created: row.time_created,
            payload: HistoryPayload {
                blockchain_ref: row
                    .blockchain_ref
                    .map(|r| r.chars().take(6).collect()),
                operation_type: row.operation_type,
                product,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<HistoryEntry>,
}

pub struct HistoryService {
    transactions: Arc<dyn PartnerTransactionRepository>,
}

impl HistoryService {
    pub fn new(transactions: Arc<dyn PartnerTransactionRepository>) -> Self {
        Self { transactions }
    }

    pub async fn list(&self, filter: &HistoryFilter) -> AppResult<HistoryResponse> {
        let page = self.transactions.history(filter).await?;

        let shown = filter.offset() + page.rows.len() as i64;
        Ok(HistoryResponse {
            count: page.count,
            next: (shown < page.count).then_some(filter.page + 1),
            previous: (filter.page > 1).then_some(filter.page - 1),
            results: page.rows.into_iter().map(HistoryEntry::from).collect(),
        })
    }
}
