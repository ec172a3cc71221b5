//! Storage seams. Each trait has a Postgres implementation and an in-memory
//! one (`database::memory`) used by tests and `SKIP_EXTERNALS` runs.

use crate::database::error::DatabaseError;
use crate::models::{
    Application, HistoryRow, LinkedAccount, NewPartnerTransaction, OperationStatus, OperationType,
    PartnerTransaction, ServiceApiKey,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type DbResult<T> = Result<T, DatabaseError>;

/// How many times a write that lost a unique-index race is retried
pub const MAX_CONFLICT_RETRIES: usize = 3;

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_tokens(
        &self,
        public_token: Uuid,
        private_token: Uuid,
    ) -> DbResult<Option<Application>>;

    /// Whether any non-deleted application is owned by this account
    async fn exists_for_tracking_id(&self, tracking_id: Uuid) -> DbResult<bool>;
}

#[async_trait]
pub trait ServiceApiKeyRepository: Send + Sync {
    async fn find_by_prefix(&self, prefix: &str) -> DbResult<Option<ServiceApiKey>>;
}

/// Result of a confirmed link
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub account: LinkedAccount,
    pub created: bool,
    pub reactivated: bool,
}

#[async_trait]
pub trait LinkedAccountRepository: Send + Sync {
    async fn find_active_by_phone(
        &self,
        phone_number: &str,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>>;

    async fn find_active_by_account(
        &self,
        account_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>>;

    async fn find_active_by_partner_id(
        &self,
        partner_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>>;

    /// Get-or-create keyed by (phone, account, merchant), reactivating an
    /// inactive row. Any other active link for the same phone or account in
    /// this merchant is deactivated in the same transaction.
    async fn link(
        &self,
        phone_number: &str,
        account_tracking_id: Uuid,
        merchant_id: i64,
        app_id: Option<i64>,
    ) -> DbResult<LinkOutcome>;
}

/// Filters for the history listing
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub account_id: Uuid,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub operation_type: Option<OperationType>,
    pub operation_status: OperationStatus,
    /// 1-based
    pub page: u32,
    pub size: u32,
}

impl HistoryFilter {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub rows: Vec<HistoryRow>,
    pub count: i64,
}

#[async_trait]
pub trait PartnerTransactionRepository: Send + Sync {
    /// Insert a PENDING row inside its own short transaction.
    async fn create(&self, new: NewPartnerTransaction) -> DbResult<PartnerTransaction>;

    async fn find(&self, operation_id: Uuid) -> DbResult<Option<PartnerTransaction>>;

    /// Compare-and-set: moves the row only if it is currently `from`.
    /// Returns `None` when the row is missing or in another state.
    async fn transition(
        &self,
        operation_id: Uuid,
        from: OperationStatus,
        to: OperationStatus,
        blockchain_ref: Option<&str>,
    ) -> DbResult<Option<PartnerTransaction>>;

    async fn mark_webhook_sent(&self, operation_id: Uuid) -> DbResult<()>;

    async fn history(&self, filter: &HistoryFilter) -> DbResult<HistoryPage>;
}
