//! Webhook notifier for finished runs.
//!
//! Endpoint: POST <webhook_url>
//! Auth: Bearer token (optional)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::Notifier;
use crate::core::ConductorResult;

/// Posts every finished run to a webhook
pub struct WebhookNotifier {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

/// Payload sent to the webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunFinishedPayload<'a> {
    /// Always "conductor.run.finished"
    event: &'static str,
    #[serde(flatten)]
    result: &'a ConductorResult,
}

impl WebhookNotifier {
    /// Create a new notifier
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, result: &ConductorResult) -> Result<()> {
        let payload = RunFinishedPayload {
            event: "conductor.run.finished",
            result,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send webhook to {}", self.endpoint))?;

        let status = response.status();
        if status.is_success() {
            // 202 Accepted is expected for async consumers
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error ({}): {}", status, text)
        }
    }
}
