use anyhow::Context;
use async_trait::async_trait;

use super::WebhookSender;

/// Posts JSON payloads to incoming-webhook URLs (chat, CRM).
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post_json(&self, url: &str, payload: &serde_json::Value) -> anyhow::Result<()> {
        self.client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("failed to post webhook")?
            .error_for_status()
            .context("webhook endpoint returned error")?;

        Ok(())
    }
}
