//! Webhook dispatcher (JSON POST via reqwest).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::types::{LABEL_NOTIFICATION_TYPE, Labels, NotificationMethod};

use crate::{Dispatcher, SendError};

/// Wire format version of [`WebhookPayload`].
pub const WEBHOOK_PAYLOAD_VERSION: u32 = 1;

/// Versioned JSON envelope POSTed to the configured endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub version: u32,
    #[serde(rename = "msgID")]
    pub msg_id: Uuid,
    #[serde(rename = "notificationType")]
    pub notification_type: String,
    pub labels: Labels,
}

/// Webhook endpoint settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint URL to POST payloads to.
    pub endpoint: String,
    /// Per-request timeout (default: 15s).
    pub request_timeout: Duration,
}

impl WebhookConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Delivers notifications as JSON webhooks.
///
/// Non-2xx responses and network errors are retryable; a malformed
/// endpoint URL is a permanent failure.
pub struct WebhookDispatcher {
    config: WebhookConfig,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Webhook
    }

    fn validate(&self, input: &Labels) -> Result<(), Vec<String>> {
        let missing = input.missing(&[LABEL_NOTIFICATION_TYPE]);
        if missing.is_empty() { Ok(()) } else { Err(missing) }
    }

    async fn send(&self, msg_id: Uuid, input: &Labels) -> Result<(), SendError> {
        let endpoint = Url::parse(&self.config.endpoint)
            .map_err(|e| SendError::Permanent(format!("invalid webhook endpoint: {e}")))?;

        let payload = WebhookPayload {
            version: WEBHOOK_PAYLOAD_VERSION,
            msg_id,
            notification_type: input.get(LABEL_NOTIFICATION_TYPE).to_string(),
            labels: input.clone(),
        };

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Retryable(format!("webhook request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Retryable(format!(
                "webhook endpoint returned {status}"
            )));
        }

        tracing::debug!(msg_id = %msg_id, %status, "Webhook delivered");
        Ok(())
    }
}
