use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::alerts::AlertSink;
use crate::core::reasoning;
use crate::core::trade_plan::TradePlan;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    text: String,
    plan: &'a TradePlan,
}

/// POSTs `{text, plan}` JSON to a chat/webhook endpoint.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn post(&self, plan: &TradePlan) -> Result<()> {
        let payload = AlertPayload {
            text: reasoning::format_alert(plan),
            plan,
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?
            .error_for_status()
            .context("webhook rejected alert")?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, plan: &TradePlan) -> bool {
        match self.post(plan).await {
            Ok(()) => {
                debug!("{}: alert delivered", plan.symbol);
                true
            }
            Err(e) => {
                error!("{}: alert delivery failed: {:#}", plan.symbol, e);
                false
            }
        }
    }
}
