//! Outbound developer webhook.
//!
//! Delivery is at-most-once: one GET with a short timeout, every failure is
//! logged and swallowed, nothing is queued for retry.

use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// GET `<webhook>?payment_id=<id>&success=true&operation_id=<id>`.
    /// Returns whether the developer acknowledged with a non-error status.
    pub async fn notify_approved(&self, webhook: &str, operation_id: Uuid) -> bool {
        let id = operation_id.to_string();
        let result = self
            .client
            .get(webhook)
            .query(&[
                ("payment_id", id.as_str()),
                ("success", "true"),
                ("operation_id", id.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response)
                if !response.status().is_client_error() && !response.status().is_server_error() =>
            {
                info!(
                    %operation_id,
                    status_code = response.status().as_u16(),
                    "developer webhook delivered"
                );
                true
            }
            Ok(response) => {
                warn!(
                    %operation_id,
                    status_code = response.status().as_u16(),
                    "developer webhook refused"
                );
                false
            }
            Err(e) => {
                warn!(%operation_id, error = %e, "developer webhook unreachable");
                false
            }
        }
    }
}
