//! Shared harness: in-memory storage, wiremock upstreams and the real router

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::Router;
use chrono::Utc;
use flouci_developers::api::{router, AppState, Repositories};
use flouci_developers::backend::{BackendClient, DataApiClient};
use flouci_developers::config::{BackendConfig, DataApiConfig, Environment, GatewayConfig};
use flouci_developers::database::memory::MemoryStore;
use flouci_developers::models::{Application, LinkedAccount};
use http::{header, Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const SIGNATURE_SECRET: &str = "catcher-secret";
pub const SERVICE_VERSION: &str = "5.0.0";
pub const BACKEND_KEY: &str = "bk_live.0123456789abcdef";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub backend: MockServer,
    pub data_api: MockServer,
}

pub fn gateway_config(environment: Environment) -> GatewayConfig {
    GatewayConfig {
        service_version: SERVICE_VERSION.to_string(),
        environment,
        signature_secret: SIGNATURE_SECRET.to_string(),
        min_payment_millimes: 100,
        notify_timeout: Duration::from_secs(2),
        pos_status_throttle: Duration::from_secs(5),
        public_base_url: "http://gateway.test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_in(Environment::Dev).await
    }

    pub async fn spawn_in(environment: Environment) -> Self {
        let backend = MockServer::start().await;
        let data_api = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        store.add_api_key("BACKEND", BACKEND_KEY).await;

        let backend_client = BackendClient::new(&BackendConfig {
            base_url: backend.uri(),
            api_key: "gateway-key".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let data_api_client = DataApiClient::new(&DataApiConfig {
            base_url: data_api.uri(),
            username: "gateway".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let state = AppState::new(
            Repositories::memory(store.clone()),
            backend_client,
            data_api_client,
            gateway_config(environment),
        );

        Self {
            router: router(state),
            store,
            backend,
            data_api,
        }
    }

    /// Verified application; `partner` grants partner access.
    pub async fn application(&self, partner: bool, test: bool) -> Application {
        let mut application = Application::new("Shop", "wallet-5f2a", 4242);
        application.has_partner_access = partner;
        application.test = test;
        application.tracking_id = Some(Uuid::new_v4());
        self.store.add_application(application).await
    }

    pub async fn linked_user(
        &self,
        application: &Application,
        phone_number: &str,
    ) -> LinkedAccount {
        let now = Utc::now();
        self.store
            .add_linked_account(LinkedAccount {
                partner_tracking_id: Uuid::new_v4(),
                account_tracking_id: Uuid::new_v4(),
                phone_number: phone_number.to_string(),
                merchant_id: application.merchant_id,
                is_active: true,
                app_id: Some(application.id),
                time_created: now,
                time_modified: now,
            })
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

pub fn bearer(application: &Application) -> String {
    format!("Bearer {}", application.bearer_token())
}

pub fn json_request(
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: &Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}
