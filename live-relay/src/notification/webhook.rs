//! Webhook message sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::json;
use tracing::{debug, warn};

use super::MessageSink;
use crate::config::WebhookSinkConfig;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

/// POSTs `{group_id, text, timestamp}` to a configured URL.
pub struct WebhookSink {
    config: WebhookSinkConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: WebhookSinkConfig) -> Self {
        let client = build_client(Duration::from_secs(config.timeout_secs));
        Self { config, client }
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.config.bearer_token
            && let Ok(value) = format!("Bearer {}", token).parse()
        {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers
    }

    fn build_payload(&self, group_id: i64, text: &str) -> serde_json::Value {
        json!({
            "group_id": group_id,
            "text": text,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl MessageSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, group_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.config.url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .headers(self.build_headers())
            .json(&self.build_payload(group_id, text))
            .send()
            .await
            .map_err(|e| Error::sink(self.name(), format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, body);
            return Err(Error::sink(self.name(), format!("{} - {}", status, body)));
        }

        debug!(group_id, "Webhook notification sent");
        Ok(())
    }
}
