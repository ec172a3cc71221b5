use crate::backend::types::{
    BackendResult, Body, LinkConfirmation, LinkInitiation, PaymentCheck, PaymentPage,
    PaymentPageRequest, PosRefundRequest, PosTransactionRequest, TransferStatus, Upstream,
    UpstreamFailure,
};
use crate::config::BackendConfig;
use crate::models::{LinkedAccount, PartnerTransaction};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Statuses treated as success unless the body says otherwise
const ACCEPTED_STATUSES: [u16; 4] = [200, 201, 202, 204];

/// HTTP client for the upstream payment backend.
///
/// Every call resolves to a [`BackendResult`]: transport faults, timeouts and
/// error statuses come back as an [`UpstreamFailure`], never as a panic.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> BackendResult<Body> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .timeout(self.timeout)
            .header(AUTHORIZATION, format!("Api-Key {}", self.api_key));

        if let Some(params) = query {
            request = request.query(params);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(%method, path, timeout = ?self.timeout, "backend request timed out");
                return Err(UpstreamFailure::timeout());
            }
            Err(e) => {
                error!(%method, path, error = %e, "backend request failed");
                return Err(UpstreamFailure::transport(format!(
                    "backend request failed: {}",
                    e
                )));
            }
        };

        let status_code = response.status().as_u16();
        debug!(
            %method,
            path,
            status_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend responded"
        );

        if response.status().is_server_error() {
            warn!(%method, path, status_code, "backend unavailable");
            return Err(UpstreamFailure::service_unavailable(status_code));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return Err(UpstreamFailure::timeout()),
            Err(e) => {
                return Err(UpstreamFailure::transport(format!(
                    "failed to read backend body: {}",
                    e
                )))
            }
        };
        let decoded = parse_object(&text);

        if !ACCEPTED_STATUSES.contains(&status_code) {
            return Err(UpstreamFailure::rejected(
                status_code,
                decoded.unwrap_or_default(),
            ));
        }

        let Some(body) = decoded else {
            error!(%method, path, status_code, "backend returned a non-object body");
            return Err(UpstreamFailure::transport("invalid backend JSON response"));
        };

        // Both signals must agree before a call counts as a success.
        if body.get("success") == Some(&Value::Bool(false)) {
            return Err(UpstreamFailure::rejected(status_code, body));
        }

        Ok(Upstream {
            status_code,
            data: body,
        })
    }

    async fn post(&self, path: &str, body: Value) -> BackendResult<Body> {
        self.execute(Method::POST, path, None, Some(&body)).await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> BackendResult<Body> {
        self.execute(Method::GET, path, Some(query), None).await
    }

    pub async fn generate_payment_page(
        &self,
        request: &PaymentPageRequest,
    ) -> BackendResult<PaymentPage> {
        let body = serde_json::to_value(request)
            .map_err(|e| UpstreamFailure::transport(e.to_string()))?;
        self.post("/api/developers/generate_payment_page", body)
            .await?
            .decode()
    }

    pub async fn check_payment(
        &self,
        payment_id: &str,
        wallet: &str,
        merchant_id: i64,
    ) -> BackendResult<PaymentCheck> {
        self.get(
            "/api/developers/check_payment",
            &[
                ("payment_id", payment_id.to_string()),
                ("wallet", wallet.to_string()),
                ("merchant_id", merchant_id.to_string()),
            ],
        )
        .await?
        .decode()
    }

    pub async fn developer_send_money(
        &self,
        amount_in_millimes: i64,
        destination: &str,
        webhook: &str,
        wallet: &str,
    ) -> BackendResult<TransferStatus> {
        self.post(
            "/api/developers/send_money",
            json!({
                "amount_in_millimes": amount_in_millimes,
                "destination": destination,
                "webhook": webhook,
                "wallet": wallet,
            }),
        )
        .await?
        .decode()
    }

    pub async fn developer_check_send_money_status(
        &self,
        operation_id: Uuid,
        sender_id: i64,
    ) -> BackendResult<TransferStatus> {
        self.get(
            "/api/developers/check_send_money_status",
            &[
                ("operation_id", operation_id.to_string()),
                ("sender_id", sender_id.to_string()),
            ],
        )
        .await?
        .decode()
    }

    pub async fn confirm_pre_authorization(
        &self,
        payment_id: &str,
        amount_in_millimes: i64,
        merchant_id: i64,
    ) -> BackendResult<Body> {
        self.post(
            "/api/developers/confirm_pre_authorization",
            json!({
                "payment_id": payment_id,
                "amount_in_millimes": amount_in_millimes,
                "merchant_id": merchant_id,
            }),
        )
        .await
    }

    pub async fn cancel_pre_authorization(
        &self,
        payment_id: &str,
        merchant_id: i64,
    ) -> BackendResult<Body> {
        self.post(
            "/api/developers/cancel_pre_authorization",
            json!({ "payment_id": payment_id, "merchant_id": merchant_id }),
        )
        .await
    }

    pub async fn initiate_link_account(
        &self,
        phone_number: &str,
        merchant_id: i64,
    ) -> BackendResult<LinkInitiation> {
        self.post(
            "/api/partners/initiate_link_account",
            json!({ "phone_number": phone_number, "merchant_id": merchant_id }),
        )
        .await?
        .decode()
    }

    pub async fn confirm_link_account(
        &self,
        phone_number: &str,
        session_id: Uuid,
        otp: &str,
        merchant_id: i64,
    ) -> BackendResult<LinkConfirmation> {
        self.post(
            "/api/partners/confirm_link_account",
            json!({
                "phone_number": phone_number,
                "session_id": session_id,
                "otp": otp,
                "merchant_id": merchant_id,
            }),
        )
        .await?
        .decode()
    }

    pub async fn is_flouci(&self, phone_number: &str, merchant_id: i64) -> BackendResult<Body> {
        self.post(
            "/api/partners/is_flouci",
            json!({ "phone_number": phone_number, "merchant_id": merchant_id }),
        )
        .await
    }

    pub async fn generate_authentication_token(
        &self,
        phone_number: &str,
        account: &LinkedAccount,
    ) -> BackendResult<Body> {
        self.post(
            "/api/partners/authenticate",
            json!({
                "phone_number": phone_number,
                "account_tracking_id": account.account_tracking_id,
                "partner_tracking_id": account.partner_tracking_id,
                "merchant_id": account.merchant_id,
            }),
        )
        .await
    }

    pub async fn get_user_balance(&self, tracking_id: Uuid) -> BackendResult<Body> {
        self.get(
            "/api/partners/balance",
            &[("tracking_id", tracking_id.to_string())],
        )
        .await
    }

    /// Ask the backend to move the money recorded by `operation`. The outcome
    /// arrives later on `callback_url`.
    pub async fn send_money(
        &self,
        operation: &PartnerTransaction,
        sender: &LinkedAccount,
        callback_url: &str,
    ) -> BackendResult<Body> {
        let payload = operation.payload();
        self.post(
            "/api/partners/send_money",
            json!({
                "operation_id": operation.operation_id,
                "operation_type": operation.operation_type,
                "amount_in_millimes": operation.amount_in_millimes,
                "sender_tracking_id": sender.account_tracking_id,
                "merchant_id": payload.merchant_id,
                "product": payload.product,
                "callback_url": callback_url,
            }),
        )
        .await
    }

    pub async fn generate_pos_transaction(
        &self,
        request: &PosTransactionRequest,
    ) -> BackendResult<Body> {
        let body = serde_json::to_value(request)
            .map_err(|e| UpstreamFailure::transport(e.to_string()))?;
        self.post("/api/partners/pos/transactions", body).await
    }

    pub async fn fetch_associated_partner_transaction(
        &self,
        merchant_id: i64,
        developer_tracking_id: Option<&str>,
        flouci_transaction_id: Option<Uuid>,
    ) -> BackendResult<Body> {
        let mut query = vec![("merchant_id", merchant_id.to_string())];
        if let Some(id) = developer_tracking_id {
            query.push(("developer_tracking_id", id.to_string()));
        }
        if let Some(id) = flouci_transaction_id {
            query.push(("flouci_transaction_id", id.to_string()));
        }

        self.get("/api/partners/pos/transaction_status", &query).await
    }

    pub async fn refund_pos_transaction(&self, request: &PosRefundRequest) -> BackendResult<Body> {
        let body = serde_json::to_value(request)
            .map_err(|e| UpstreamFailure::transport(e.to_string()))?;
        self.post("/api/partners/pos/refund", body).await
    }
}

/// Empty bodies (204) decode to an empty object; anything that is not a
/// JSON object yields `None`.
fn parse_object(text: &str) -> Option<Body> {
    if text.trim().is_empty() {
        return Some(Body::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(body)) => Some(body),
        _ => None,
    }
}
