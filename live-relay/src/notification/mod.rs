//! Outbound notifications.
//!
//! Formatted text is handed to a [`MessageSink`], which owns delivery:
//! - [`LogSink`] writes through tracing
//! - [`WebhookSink`] POSTs JSON to an HTTP endpoint

pub mod messages;
mod log_sink;
mod webhook;

pub use log_sink::LogSink;
pub use webhook::WebhookSink;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::config::SinkConfig;

/// Delivers formatted text to a subscriber group.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sink type name, used in logs.
    fn name(&self) -> &'static str;

    /// Deliver `text` to `group_id`. Failures are not retried.
    async fn send(&self, group_id: i64, text: &str) -> Result<()>;
}

/// Build the sink selected by configuration.
pub fn build_sink(config: &SinkConfig) -> Arc<dyn MessageSink> {
    match config {
        SinkConfig::Log => Arc::new(LogSink),
        SinkConfig::Webhook(webhook) => Arc::new(WebhookSink::new(webhook.clone())),
    }
}
