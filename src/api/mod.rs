//! HTTP surface: shared state and the route table

pub mod developers;
pub mod envelope;
pub mod internal;
pub mod partners;
pub mod pos;
pub mod validation;

use crate::backend::{BackendClient, DataApiClient};
use crate::cache::throttle::{MemoryThrottle, RequestThrottle};
use crate::config::GatewayConfig;
use crate::database::application_repository::{PgApplicationRepository, PgServiceApiKeyRepository};
use crate::database::linked_account_repository::PgLinkedAccountRepository;
use crate::database::memory::MemoryStore;
use crate::database::partner_transaction_repository::PgPartnerTransactionRepository;
use crate::database::repository::{
    ApplicationRepository, LinkedAccountRepository, PartnerTransactionRepository,
    ServiceApiKeyRepository,
};
use crate::health::HealthChecker;
use crate::services::{HistoryService, LinkAccountService, PaymentLedger, WebhookNotifier};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Storage behind the handlers
#[derive(Clone)]
pub struct Repositories {
    pub applications: Arc<dyn ApplicationRepository>,
    pub api_keys: Arc<dyn ServiceApiKeyRepository>,
    pub linked_accounts: Arc<dyn LinkedAccountRepository>,
    pub transactions: Arc<dyn PartnerTransactionRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            applications: Arc::new(PgApplicationRepository::new(pool.clone())),
            api_keys: Arc::new(PgServiceApiKeyRepository::new(pool.clone())),
            linked_accounts: Arc::new(PgLinkedAccountRepository::new(pool.clone())),
            transactions: Arc::new(PgPartnerTransactionRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            applications: store.clone(),
            api_keys: store.clone(),
            linked_accounts: store.clone(),
            transactions: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub applications: Arc<dyn ApplicationRepository>,
    pub api_keys: Arc<dyn ServiceApiKeyRepository>,
    pub linked_accounts: Arc<dyn LinkedAccountRepository>,
    pub backend: BackendClient,
    pub data_api: Arc<DataApiClient>,
    pub throttle: Arc<dyn RequestThrottle>,
    pub links: Arc<LinkAccountService>,
    pub ledger: Arc<PaymentLedger>,
    pub history: Arc<HistoryService>,
    pub gateway: Arc<GatewayConfig>,
    pub health: HealthChecker,
}

impl AppState {
    pub fn new(
        repositories: Repositories,
        backend: BackendClient,
        data_api: DataApiClient,
        gateway: GatewayConfig,
    ) -> Self {
        let notifier = WebhookNotifier::new(gateway.notify_timeout);
        let ledger = PaymentLedger::new(
            repositories.transactions.clone(),
            backend.clone(),
            notifier,
            gateway.catcher_url(),
        );

        Self {
            links: Arc::new(LinkAccountService::new(
                repositories.linked_accounts.clone(),
                backend.clone(),
            )),
            ledger: Arc::new(ledger),
            history: Arc::new(HistoryService::new(repositories.transactions)),
            applications: repositories.applications,
            api_keys: repositories.api_keys,
            linked_accounts: repositories.linked_accounts,
            backend,
            data_api: Arc::new(data_api),
            throttle: Arc::new(MemoryThrottle::new()),
            gateway: Arc::new(gateway),
            health: HealthChecker::default(),
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn RequestThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state
        .health
        .check_health(&state.gateway.service_version)
        .await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

pub fn router(state: AppState) -> Router {
    let partners = Router::new()
        .route(
            "/accounts/initiate_link_account",
            post(partners::initiate_link_account),
        )
        .route(
            "/accounts/confirm_link_account",
            post(partners::confirm_link_account),
        )
        .route("/accounts/is_flouci", post(partners::is_flouci))
        .route("/accounts/authenticate", post(partners::authenticate))
        .route("/transactions/balance", get(partners::balance))
        .route("/v1/transactions/balance", get(partners::balance))
        .route("/transactions/history", get(partners::history))
        .route("/v1/transactions/history", get(partners::history))
        .route(
            "/transactions/initiate_payment",
            post(partners::initiate_payment),
        )
        .route(
            "/v1/transactions/initiate_payment",
            post(partners::initiate_payment_v1),
        )
        .route("/transactions/send_money", post(developers::send_money_v2))
        .route(
            "/internal/send_money_catcher",
            post(internal::send_money_catcher),
        )
        .route(
            "/transactions/init_pos_transaction",
            post(pos::init_pos_transaction),
        )
        .route(
            "/transactions/fetch_gps_transaction_status",
            get(pos::fetch_pos_transaction_status),
        )
        .route(
            "/transactions/cancel_pos_transaction",
            post(pos::cancel_pos_transaction),
        );

    let developers = Router::new()
        .route("/generate_payment", post(developers::generate_payment_v1))
        .route("/v2/generate_payment", post(developers::generate_payment_v2))
        .route(
            "/verify_payment/{payment_id}",
            get(developers::verify_payment_v1),
        )
        .route(
            "/v2/verify_payment/{payment_id}",
            get(developers::verify_payment_v2),
        )
        .route("/send_money", post(developers::send_money_v1))
        .route("/v2/send_money", post(developers::send_money_v2))
        .route(
            "/check_send_money_status",
            get(developers::check_send_money_status_v1),
        )
        .route(
            "/v2/check_send_money_status",
            get(developers::check_send_money_status_v2),
        )
        .route("/accept", post(developers::accept_v1))
        .route("/v2/accept", post(developers::accept_v2))
        .route(
            "/add_pos_transaction",
            post(developers::add_pos_transaction_v1),
        )
        .route(
            "/v2/add_pos_transaction",
            post(developers::add_pos_transaction_v2),
        )
        .route(
            "/v2/confirm_pre_authorization",
            post(developers::confirm_pre_authorization),
        )
        .route(
            "/v2/cancel_pre_authorization",
            post(developers::cancel_pre_authorization),
        )
        .route(
            "/internal/send_money_catcher",
            post(internal::send_money_catcher),
        )
        .route(
            "/internal/check_user_exists/{tracking_id}",
            get(internal::check_user_exists),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/partners", partners)
        .nest("/api", developers)
        .with_state(state)
}
