mod bot;

use anyhow::Result;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use signal_consensus_bot::config::Config;

use crate::bot::AlertBot;

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = Config::from_env();
    let log_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "INFO".to_string());

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    let shared_config = cfg.shared();

    let mut bot = AlertBot::new(shared_config).await?;
    bot.run().await?;

    Ok(())
}
