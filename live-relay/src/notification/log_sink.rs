use async_trait::async_trait;
use tracing::info;

use super::MessageSink;
use crate::Result;

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, group_id: i64, text: &str) -> Result<()> {
        info!(group_id, "Notification:\n{}", text);
        Ok(())
    }
}
