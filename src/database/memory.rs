//! In-process store with the same semantics as the Postgres repositories,
//! including the active-link uniqueness rule and compare-and-set transitions.

use crate::auth::api_key::hash_api_key;
use crate::database::repository::{
    ApplicationRepository, DbResult, HistoryFilter, HistoryPage, LinkOutcome,
    LinkedAccountRepository, PartnerTransactionRepository, ServiceApiKeyRepository,
};
use crate::models::{
    Application, HistoryRow, LinkedAccount, NewPartnerTransaction, OperationStatus,
    PartnerTransaction, ServiceApiKey,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    applications: RwLock<Vec<Application>>,
    api_keys: RwLock<Vec<ServiceApiKey>>,
    linked_accounts: RwLock<Vec<LinkedAccount>>,
    transactions: RwLock<HashMap<Uuid, PartnerTransaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn add_application(&self, mut application: Application) -> Application {
        application.id = self.next_id();
        self.applications.write().await.push(application.clone());
        application
    }

    /// Register a service key given in its full `<prefix>.<secret>` form.
    pub async fn add_api_key(&self, name: &str, full_key: &str) {
        let prefix = full_key.split('.').next().unwrap_or_default().to_string();
        self.api_keys.write().await.push(ServiceApiKey {
            id: self.next_id(),
            name: name.to_string(),
            prefix,
            hashed_key: hash_api_key(full_key),
            revoked: false,
            created_at: Utc::now(),
        });
    }

    pub async fn add_linked_account(&self, account: LinkedAccount) -> LinkedAccount {
        self.linked_accounts.write().await.push(account.clone());
        account
    }

    pub async fn insert_transaction(&self, transaction: PartnerTransaction) {
        self.transactions
            .write()
            .await
            .insert(transaction.operation_id, transaction);
    }

    pub async fn linked_accounts(&self) -> Vec<LinkedAccount> {
        self.linked_accounts.read().await.clone()
    }

    pub async fn transactions(&self) -> Vec<PartnerTransaction> {
        self.transactions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn find_by_tokens(
        &self,
        public_token: Uuid,
        private_token: Uuid,
    ) -> DbResult<Option<Application>> {
        Ok(self
            .applications
            .read()
            .await
            .iter()
            .find(|a| a.public_token == public_token && a.private_token == private_token)
            .cloned())
    }

    async fn exists_for_tracking_id(&self, tracking_id: Uuid) -> DbResult<bool> {
        Ok(self
            .applications
            .read()
            .await
            .iter()
            .any(|a| a.tracking_id == Some(tracking_id) && !a.deleted))
    }
}

#[async_trait]
impl ServiceApiKeyRepository for MemoryStore {
    async fn find_by_prefix(&self, prefix: &str) -> DbResult<Option<ServiceApiKey>> {
        Ok(self
            .api_keys
            .read()
            .await
            .iter()
            .find(|k| k.prefix == prefix)
            .cloned())
    }
}

#[async_trait]
impl LinkedAccountRepository for MemoryStore {
    async fn find_active_by_phone(
        &self,
        phone_number: &str,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        Ok(self
            .linked_accounts
            .read()
            .await
            .iter()
            .find(|a| a.is_active && a.phone_number == phone_number && a.merchant_id == merchant_id)
            .cloned())
    }

    async fn find_active_by_account(
        &self,
        account_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        Ok(self
            .linked_accounts
            .read()
            .await
            .iter()
            .find(|a| {
                a.is_active
                    && a.account_tracking_id == account_tracking_id
                    && a.merchant_id == merchant_id
            })
            .cloned())
    }

    async fn find_active_by_partner_id(
        &self,
        partner_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        Ok(self
            .linked_accounts
            .read()
            .await
            .iter()
            .find(|a| {
                a.is_active
                    && a.partner_tracking_id == partner_tracking_id
                    && a.merchant_id == merchant_id
            })
            .cloned())
    }

    async fn link(
        &self,
        phone_number: &str,
        account_tracking_id: Uuid,
        merchant_id: i64,
        app_id: Option<i64>,
    ) -> DbResult<LinkOutcome> {
        // The write lock serializes confirmations the way the unique indexes do.
        let mut accounts = self.linked_accounts.write().await;
        let now = Utc::now();

        for account in accounts.iter_mut() {
            let same_phone = account.phone_number == phone_number;
            let same_account = account.account_tracking_id == account_tracking_id;
            let same_key = same_phone && same_account;
            let overlaps = same_phone || same_account;
            if account.merchant_id == merchant_id && account.is_active && overlaps && !same_key {
                account.is_active = false;
                account.time_modified = now;
            }
        }

        if let Some(account) = accounts.iter_mut().find(|a| {
            a.phone_number == phone_number
                && a.account_tracking_id == account_tracking_id
                && a.merchant_id == merchant_id
        }) {
            let reactivated = !account.is_active;
            if reactivated {
                account.is_active = true;
                account.time_modified = now;
            }
            return Ok(LinkOutcome {
                account: account.clone(),
                created: false,
                reactivated,
            });
        }

        let account = LinkedAccount {
            partner_tracking_id: Uuid::new_v4(),
            account_tracking_id,
            phone_number: phone_number.to_string(),
            merchant_id,
            is_active: true,
            app_id,
            time_created: now,
            time_modified: now,
        };
        accounts.push(account.clone());

        Ok(LinkOutcome {
            account,
            created: true,
            reactivated: false,
        })
    }
}

#[async_trait]
impl PartnerTransactionRepository for MemoryStore {
    async fn create(&self, new: NewPartnerTransaction) -> DbResult<PartnerTransaction> {
        let now = Utc::now();
        let row = PartnerTransaction {
            operation_id: Uuid::new_v4(),
            operation_type: new.operation_type,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            amount_in_millimes: new.amount_in_millimes,
            operation_payload: new.payload.to_value(),
            operation_status: OperationStatus::Pending,
            blockchain_ref: None,
            time_created: now,
            time_modified: now,
        };
        self.transactions
            .write()
            .await
            .insert(row.operation_id, row.clone());
        Ok(row)
    }

    async fn find(&self, operation_id: Uuid) -> DbResult<Option<PartnerTransaction>> {
        Ok(self.transactions.read().await.get(&operation_id).cloned())
    }

    async fn transition(
        &self,
        operation_id: Uuid,
        from: OperationStatus,
        to: OperationStatus,
        blockchain_ref: Option<&str>,
    ) -> DbResult<Option<PartnerTransaction>> {
        let mut transactions = self.transactions.write().await;
        let Some(row) = transactions.get_mut(&operation_id) else {
            return Ok(None);
        };
        if row.operation_status != from {
            return Ok(None);
        }

        row.operation_status = to;
        if row.blockchain_ref.is_none() {
            row.blockchain_ref = blockchain_ref.map(str::to_string);
        }
        row.time_modified = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn mark_webhook_sent(&self, operation_id: Uuid) -> DbResult<()> {
        if let Some(row) = self.transactions.write().await.get_mut(&operation_id) {
            if let Some(payload) = row.operation_payload.as_object_mut() {
                payload.insert("webhook_sent".to_string(), serde_json::Value::Bool(true));
            }
            row.time_modified = Utc::now();
        }
        Ok(())
    }

    async fn history(&self, filter: &HistoryFilter) -> DbResult<HistoryPage> {
        let accounts = self.linked_accounts.read().await;
        let phone_of = |id: Option<Uuid>| {
            id.and_then(|id| {
                accounts
                    .iter()
                    .find(|a| a.partner_tracking_id == id)
                    .map(|a| a.phone_number.clone())
            })
        };

        let transactions = self.transactions.read().await;
        let mut matching: Vec<&PartnerTransaction> = transactions
            .values()
            .filter(|t| {
                (t.sender_id == Some(filter.account_id) || t.receiver_id == Some(filter.account_id))
                    && t.time_created >= filter.from_date
                    && t.time_created <= filter.to_date
                    && filter.operation_type.map_or(true, |ty| t.operation_type == ty)
                    && t.operation_status == filter.operation_status
            })
            .collect();
        matching.sort_by(|a, b| b.time_created.cmp(&a.time_created));

        let count = matching.len() as i64;
        let rows = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.size as usize)
            .map(|t| HistoryRow {
                operation_id: t.operation_id,
                operation_type: t.operation_type,
                operation_status: t.operation_status,
                operation_payload: t.operation_payload.clone(),
                blockchain_ref: t.blockchain_ref.clone(),
                sender_phone: phone_of(t.sender_id),
                receiver_phone: phone_of(t.receiver_id),
                time_created: t.time_created,
            })
            .collect();

        Ok(HistoryPage { rows, count })
    }
}
