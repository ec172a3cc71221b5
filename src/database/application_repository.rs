use crate::database::error::DatabaseError;
use crate::database::repository::{
    ApplicationRepository, DbResult, ServiceApiKeyRepository,
};
use crate::models::{Application, ServiceApiKey};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const APPLICATION_COLUMNS: &str = "id, app_id, name, description, public_token, private_token, \
     tracking_id, wallet, merchant_id, status, active, test, deleted, has_partner_access, \
     webhook, gross, transaction_number, revoke_number, last_revoke_date, date_created";

/// Read-side access to developer applications. Registration and key
/// rotation are owned by the developer console.
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn find_by_tokens(
        &self,
        public_token: Uuid,
        private_token: Uuid,
    ) -> DbResult<Option<Application>> {
        let sql = format!(
            "SELECT {} FROM applications WHERE public_token = $1 AND private_token = $2",
            APPLICATION_COLUMNS
        );

        sqlx::query_as::<_, Application>(&sql)
            .bind(public_token)
            .bind(private_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn exists_for_tracking_id(&self, tracking_id: Uuid) -> DbResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE tracking_id = $1 AND NOT deleted)",
        )
        .bind(tracking_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

pub struct PgServiceApiKeyRepository {
    pool: PgPool,
}

impl PgServiceApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceApiKeyRepository for PgServiceApiKeyRepository {
    async fn find_by_prefix(&self, prefix: &str) -> DbResult<Option<ServiceApiKey>> {
        sqlx::query_as::<_, ServiceApiKey>(
            "SELECT id, name, prefix, hashed_key, revoked, created_at
             FROM service_api_keys WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
