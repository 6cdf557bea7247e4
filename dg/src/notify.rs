//! Notification sink
//!
//! Best-effort delivery of user-facing events to a configured webhook. A
//! missing or unreachable sink never fails the calling tool; the caller
//! reports the degraded delivery instead.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::NotifyConfig;

/// Webhook-backed notification sink
#[derive(Clone)]
pub struct NotificationSink {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl NotificationSink {
    pub fn new(config: &NotifyConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            webhook_url: config.webhook_url.clone(),
        }
    }

    /// Whether a delivery target is configured
    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Deliver an event; returns whether delivery succeeded
    pub async fn send(&self, event: &str, payload: &Value) -> bool {
        let Some(ref url) = self.webhook_url else {
            debug!(event, "NotificationSink: no webhook configured, dropping");
            return false;
        };

        let body = json!({
            "event": event,
            "payload": payload,
            "sent_at": dredgestore::now_iso(),
        });

        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(event, "NotificationSink: delivered");
                true
            }
            Ok(response) => {
                warn!(event, status = %response.status(), "NotificationSink: sink rejected event");
                false
            }
            Err(e) => {
                warn!(event, error = %e, "NotificationSink: delivery failed");
                false
            }
        }
    }
}
