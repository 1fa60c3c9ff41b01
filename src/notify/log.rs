//! Log-only notifier for development and tests.

use async_trait::async_trait;
use tracing::info;

use super::{Notice, Notifier, NotifyError};

/// Writes every notice to the log instead of delivering it anywhere.
pub struct LogNotifier {
    prefix: String,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self {
            prefix: "NOTICE".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!(
            kind = %notice.kind,
            channel = %notice.channel_id,
            deliveries = notice.delivery_ids.len(),
            aggregation = ?notice.aggregation,
            "[{}] notice", self.prefix
        );
        Ok(())
    }
}
