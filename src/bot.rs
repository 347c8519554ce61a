use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};

use signal_consensus_bot::alerts::{AlertSink, JsonlStore, LogSink, WebhookSink};
use signal_consensus_bot::config::SharedConfig;
use signal_consensus_bot::core::reasoning;
use signal_consensus_bot::scanner::Scanner;
use signal_consensus_bot::sources::SnapshotFileSource;

pub struct AlertBot {
    config: SharedConfig,
    scanner: Arc<Scanner>,
    started: Instant,
}

impl AlertBot {
    pub async fn new(config: SharedConfig) -> Result<Self> {
        let cfg = config.read().await;

        info!("{}", "=".repeat(60));
        info!("Signal consensus bot starting up");
        info!("Instruments: {}", cfg.instruments.join(", "));
        info!("Scan interval: {}s", cfg.scan_interval);
        info!("Snapshots: {}", cfg.snapshot_dir);
        info!(
            "Consensus: min {} groups | action strength >= {:.0} conf >= {:.0}",
            cfg.consensus.min_groups_required,
            cfg.consensus.action_min_strength,
            cfg.consensus.action_min_confidence
        );
        info!(
            "Plans: conf >= {:.0} | risk <= {:.2} | R:R >= {:.2} | levels {}",
            cfg.plan.min_confidence, cfg.plan.max_risk_score, cfg.plan.min_rr, cfg.plan.level_precedence
        );
        info!(
            "Alerts: conf >= {:.0} | R:R >= {:.2} | cooldown {}s",
            cfg.gate.min_conf_for_alert, cfg.gate.min_rr_for_alert, cfg.gate.min_notify_interval_secs
        );

        let sink: Arc<dyn AlertSink> = match &cfg.alert_webhook_url {
            Some(url) => {
                info!("Sink: webhook");
                Arc::new(WebhookSink::new(url)?)
            }
            None => {
                info!("Sink: log (ALERT_WEBHOOK_URL not set)");
                Arc::new(LogSink)
            }
        };
        info!("{}", "=".repeat(60));

        let source = Arc::new(SnapshotFileSource::new(&cfg.snapshot_dir));
        let store = Arc::new(JsonlStore::new(Path::new(&cfg.log_dir)));
        let scanner = Arc::new(Scanner::new(&cfg, source, sink, store));

        drop(cfg);

        Ok(Self {
            config,
            scanner,
            started: Instant::now(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Press Ctrl+C to stop.");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scanner = self.scanner.clone();
        let mut task = tokio::spawn(async move { scanner.run(shutdown_rx).await });

        let cycles = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, finishing in-flight evaluations...");
                let _ = shutdown_tx.send(true);
                task.await
            }
            res = &mut task => {
                warn!("Scanner exited without a shutdown request");
                res
            }
        };

        match cycles {
            Ok(n) => info!("Completed {} cycle(s)", n),
            Err(e) => error!("Scanner task failed: {}", e),
        }

        self.shutdown().await;
        Ok(())
    }

    async fn print_status(&self) {
        let cfg = self.config.read().await;
        let gate = self.scanner.gate();
        let gate = gate.lock().await;

        info!("Uptime: {}s", self.started.elapsed().as_secs());
        info!(
            "Tracked: {}/{} instrument(s)",
            gate.tracked(),
            self.scanner.instruments().len()
        );
        for symbol in &cfg.instruments {
            match gate.state(symbol) {
                Some(state) => info!(
                    "  {}: {} | {} at {}",
                    symbol,
                    reasoning::summarize_plan(&state.last_plan),
                    if state.sent_last_time { "sent" } else { "suppressed" },
                    state.last_considered_at.format("%Y-%m-%d %H:%M:%S")
                ),
                None => info!("  {}: no plan yet", symbol),
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.print_status().await;
        info!("Bot stopped.");
    }
}
