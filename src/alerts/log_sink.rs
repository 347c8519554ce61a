use async_trait::async_trait;
use tracing::info;

use crate::alerts::AlertSink;
use crate::core::reasoning;
use crate::core::trade_plan::TradePlan;

/// Writes alerts to the log. Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, plan: &TradePlan) -> bool {
        info!("{}", "=".repeat(60));
        for line in reasoning::format_alert(plan).lines() {
            info!("  {}", line);
        }
        info!("{}", "=".repeat(60));
        true
    }
}
