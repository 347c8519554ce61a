pub mod log_sink;
pub mod store;
pub mod webhook;

pub use log_sink::LogSink;
pub use store::{JsonlStore, PlanRecord};
pub use webhook::WebhookSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::trade_plan::TradePlan;

/// Human-facing alert transport. Best effort: returns whether delivery succeeded,
/// never retries.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, plan: &TradePlan) -> bool;
}

/// History of every gated plan. Fire-and-forget; failures never reach the gate.
pub trait PlanStore: Send + Sync {
    fn persist(&self, symbol: &str, plan: &TradePlan, sent: bool, timestamp: DateTime<Utc>);
}
