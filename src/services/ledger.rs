//! Partner payments: record intent, hand off to the backend, settle on callback

use crate::backend::{BackendClient, BackendResult, Body};
use crate::database::repository::PartnerTransactionRepository;
use crate::error::{AppResult, DomainError};
use crate::models::{
    LinkedAccount, NewPartnerTransaction, OperationPayload, OperationStatus, OperationType,
    PartnerTransaction,
};
use crate::services::notifier::WebhookNotifier;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A recorded payment and what the backend said about it
#[derive(Debug)]
pub struct InitiatedPayment {
    pub operation: PartnerTransaction,
    pub upstream: BackendResult<Body>,
}

/// Final state reached by a callback
#[derive(Debug, Clone)]
pub enum Settlement {
    Approved {
        operation: PartnerTransaction,
        webhook_sent: bool,
    },
    Declined {
        operation: PartnerTransaction,
    },
}

pub struct PaymentLedger {
    transactions: Arc<dyn PartnerTransactionRepository>,
    backend: BackendClient,
    notifier: WebhookNotifier,
    catcher_url: String,
}

impl PaymentLedger {
    pub fn new(
        transactions: Arc<dyn PartnerTransactionRepository>,
        backend: BackendClient,
        notifier: WebhookNotifier,
        catcher_url: String,
    ) -> Self {
        Self {
            transactions,
            backend,
            notifier,
            catcher_url,
        }
    }

    /// Insert a PENDING row, then (outside any DB transaction) ask the backend
    /// to move the money. The upstream answer alone decides DATA_API_PENDING
    /// or DECLINED.
    pub async fn initiate_payment(
        &self,
        account: &LinkedAccount,
        amount_in_millimes: i64,
        product: &str,
        webhook: Option<String>,
    ) -> AppResult<InitiatedPayment> {
        let operation = self
            .transactions
            .create(NewPartnerTransaction {
                operation_type: OperationType::Payment,
                sender_id: Some(account.partner_tracking_id),
                receiver_id: None,
                amount_in_millimes,
                payload: OperationPayload {
                    merchant_id: account.merchant_id,
                    product: Some(product.to_string()),
                    webhook,
                    webhook_sent: None,
                },
            })
            .await?;

        info!(
            operation_id = %operation.operation_id,
            merchant_id = account.merchant_id,
            amount_in_millimes,
            "payment recorded"
        );

        let upstream = self
            .backend
            .send_money(&operation, account, &self.catcher_url)
            .await;

        let next = match &upstream {
            Ok(_) => OperationStatus::DataApiPending,
            Err(failure) => {
                warn!(
                    operation_id = %operation.operation_id,
                    status_code = failure.status_code,
                    code = failure.code,
                    "backend declined payment"
                );
                OperationStatus::Declined
            }
        };

        let operation = match self
            .transactions
            .transition(operation.operation_id, OperationStatus::Pending, next, None)
            .await?
        {
            Some(updated) => updated,
            None => {
                error!(
                    operation_id = %operation.operation_id,
                    to = %next,
                    "payment left PENDING before the backend answered"
                );
                operation
            }
        };

        Ok(InitiatedPayment {
            operation,
            upstream,
        })
    }

    /// Apply an upstream callback. Only a DATA_API_PENDING row can settle; any
    /// other state (including an already-settled one) reads as not found, so a
    /// replay changes nothing and notifies nobody.
    pub async fn settle(&self, operation_id: Uuid, result: &Value) -> AppResult<Settlement> {
        let not_found = || DomainError::TransactionNotFound {
            operation_id: operation_id.to_string(),
        };

        let current = self
            .transactions
            .find(operation_id)
            .await?
            .filter(|row| row.operation_status == OperationStatus::DataApiPending)
            .ok_or_else(not_found)?;

        let succeeded = result.get("success").and_then(Value::as_bool) == Some(true);
        if !succeeded {
            let operation = self
                .transactions
                .transition(
                    current.operation_id,
                    OperationStatus::DataApiPending,
                    OperationStatus::Declined,
                    None,
                )
                .await?
                .ok_or_else(not_found)?;

            info!(%operation_id, error = ?result.get("error"), "payment declined by callback");
            return Ok(Settlement::Declined { operation });
        }

        let blockchain_ref = result.get("transactionId").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        let operation = self
            .transactions
            .transition(
                current.operation_id,
                OperationStatus::DataApiPending,
                OperationStatus::Approved,
                blockchain_ref.as_deref(),
            )
            .await?
            .ok_or_else(not_found)?;

        info!(%operation_id, "payment approved by callback");

        let mut webhook_sent = false;
        if let Some(webhook) = operation.payload().webhook {
            if self.notifier.notify_approved(&webhook, operation_id).await {
                webhook_sent = true;
                // The payment is settled either way; only the flag is lost.
                if let Err(e) = self.transactions.mark_webhook_sent(operation_id).await {
                    warn!(%operation_id, error = %e, "could not record webhook delivery");
                }
            }
        }

        Ok(Settlement::Approved {
            operation,
            webhook_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::database::error::{DatabaseError, DatabaseErrorKind};
    use crate::database::memory::MemoryStore;
    use crate::database::repository::{DbResult, HistoryFilter, HistoryPage};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Memory ledger whose webhook bookkeeping write always fails
    struct FlagWriteFails(MemoryStore);

    #[async_trait]
    impl PartnerTransactionRepository for FlagWriteFails {
        async fn create(&self, new: NewPartnerTransaction) -> DbResult<PartnerTransaction> {
            self.0.create(new).await
        }

        async fn find(&self, operation_id: Uuid) -> DbResult<Option<PartnerTransaction>> {
            self.0.find(operation_id).await
        }

        async fn transition(
            &self,
            operation_id: Uuid,
            from: OperationStatus,
            to: OperationStatus,
            blockchain_ref: Option<&str>,
        ) -> DbResult<Option<PartnerTransaction>> {
            self.0.transition(operation_id, from, to, blockchain_ref).await
        }

        async fn mark_webhook_sent(&self, _operation_id: Uuid) -> DbResult<()> {
            Err(DatabaseError::new(DatabaseErrorKind::ConnectionFailed {
                message: "connection reset".to_string(),
            }))
        }

        async fn history(&self, filter: &HistoryFilter) -> DbResult<HistoryPage> {
            self.0.history(filter).await
        }
    }

    #[tokio::test]
    async fn test_approval_survives_failed_webhook_bookkeeping() {
        let developer = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paid"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&developer)
            .await;

        let store = MemoryStore::new();
        let now = Utc::now();
        let operation_id = Uuid::new_v4();
        store
            .insert_transaction(PartnerTransaction {
                operation_id,
                operation_type: OperationType::Payment,
                sender_id: Some(Uuid::new_v4()),
                receiver_id: None,
                amount_in_millimes: 5000,
                operation_payload: OperationPayload {
                    merchant_id: 4242,
                    product: Some("005".to_string()),
                    webhook: Some(format!("{}/paid", developer.uri())),
                    webhook_sent: None,
                }
                .to_value(),
                operation_status: OperationStatus::DataApiPending,
                blockchain_ref: None,
                time_created: now,
                time_modified: now,
            })
            .await;

        let backend = BackendClient::new(&BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "unused".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let ledger = PaymentLedger::new(
            Arc::new(FlagWriteFails(store)),
            backend,
            WebhookNotifier::new(Duration::from_secs(2)),
            "http://gateway.test/catcher".to_string(),
        );

        let settlement = ledger
            .settle(operation_id, &json!({"success": true, "transactionId": "0xabc"}))
            .await
            .unwrap();

        match settlement {
            Settlement::Approved {
                operation,
                webhook_sent,
            } => {
                assert_eq!(operation.operation_status, OperationStatus::Approved);
                assert!(webhook_sent);
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }
}
