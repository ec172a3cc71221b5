use crate::database::error::DatabaseError;
use crate::database::repository::{
    DbResult, LinkOutcome, LinkedAccountRepository, MAX_CONFLICT_RETRIES,
};
use crate::models::LinkedAccount;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

const COLUMNS: &str = "partner_tracking_id, account_tracking_id, phone_number, merchant_id, \
     is_active, app_id, time_created, time_modified";

pub struct PgLinkedAccountRepository {
    pool: PgPool,
}

impl PgLinkedAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_active(
        &self,
        clause: &str,
        key: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        let sql = format!(
            "SELECT {} FROM linked_accounts WHERE {} = $1 AND merchant_id = $2 AND is_active",
            COLUMNS, clause
        );

        sqlx::query_as::<_, LinkedAccount>(&sql)
            .bind(key)
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn try_link(
        &self,
        phone_number: &str,
        account_tracking_id: Uuid,
        merchant_id: i64,
        app_id: Option<i64>,
    ) -> DbResult<LinkOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // A confirmed OTP supersedes whatever this phone or account was linked to before.
        let superseded = sqlx::query(
            "UPDATE linked_accounts SET is_active = FALSE, time_modified = NOW()
             WHERE merchant_id = $3 AND is_active
               AND (phone_number = $1 OR account_tracking_id = $2)
               AND NOT (phone_number = $1 AND account_tracking_id = $2)",
        )
        .bind(phone_number)
        .bind(account_tracking_id)
        .bind(merchant_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if superseded.rows_affected() > 0 {
            debug!(
                merchant_id,
                rows = superseded.rows_affected(),
                "Deactivated superseded links"
            );
        }

        let select = format!(
            "SELECT {} FROM linked_accounts
             WHERE phone_number = $1 AND account_tracking_id = $2 AND merchant_id = $3
             FOR UPDATE",
            COLUMNS
        );
        let existing = sqlx::query_as::<_, LinkedAccount>(&select)
            .bind(phone_number)
            .bind(account_tracking_id)
            .bind(merchant_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let outcome = match existing {
            Some(account) if account.is_active => LinkOutcome {
                account,
                created: false,
                reactivated: false,
            },
            Some(account) => {
                let sql = format!(
                    "UPDATE linked_accounts SET is_active = TRUE, time_modified = NOW()
                     WHERE partner_tracking_id = $1 RETURNING {}",
                    COLUMNS
                );
                let account = sqlx::query_as::<_, LinkedAccount>(&sql)
                    .bind(account.partner_tracking_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;
                LinkOutcome {
                    account,
                    created: false,
                    reactivated: true,
                }
            }
            None => {
                let sql = format!(
                    "INSERT INTO linked_accounts
                     (partner_tracking_id, account_tracking_id, phone_number, merchant_id, is_active, app_id)
                     VALUES ($1, $2, $3, $4, TRUE, $5) RETURNING {}",
                    COLUMNS
                );
                let account = sqlx::query_as::<_, LinkedAccount>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(account_tracking_id)
                    .bind(phone_number)
                    .bind(merchant_id)
                    .bind(app_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;
                LinkOutcome {
                    account,
                    created: true,
                    reactivated: false,
                }
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(outcome)
    }
}

#[async_trait]
impl LinkedAccountRepository for PgLinkedAccountRepository {
    async fn find_active_by_phone(
        &self,
        phone_number: &str,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        let sql = format!(
            "SELECT {} FROM linked_accounts WHERE phone_number = $1 AND merchant_id = $2 AND is_active",
            COLUMNS
        );

        sqlx::query_as::<_, LinkedAccount>(&sql)
            .bind(phone_number)
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_active_by_account(
        &self,
        account_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        self.find_active("account_tracking_id", account_tracking_id, merchant_id)
            .await
    }

    async fn find_active_by_partner_id(
        &self,
        partner_tracking_id: Uuid,
        merchant_id: i64,
    ) -> DbResult<Option<LinkedAccount>> {
        self.find_active("partner_tracking_id", partner_tracking_id, merchant_id)
            .await
    }

    async fn link(
        &self,
        phone_number: &str,
        account_tracking_id: Uuid,
        merchant_id: i64,
        app_id: Option<i64>,
    ) -> DbResult<LinkOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .try_link(phone_number, account_tracking_id, merchant_id, app_id)
                .await
            {
                // A concurrent confirmation won the insert; the next pass finds its row.
                Err(e) if e.is_unique_violation() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(attempt, merchant_id, error = %e, "Link write conflicted, retrying");
                }
                other => return other,
            }
        }
    }
}
