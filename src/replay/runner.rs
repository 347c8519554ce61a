use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::alerts::{AlertSink, PlanStore};
use crate::config::Config;
use crate::core::trade_plan::TradePlan;
use crate::models::InstrumentSnapshot;
use crate::scanner::Scanner;
use crate::sources::MemorySource;

use super::report::ReplayReport;

/// All snapshots observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub timestamp: DateTime<Utc>,
    pub snapshots: Vec<InstrumentSnapshot>,
}

/// Keeps every plan the gate lets through instead of delivering it.
#[derive(Default)]
struct CollectingSink {
    plans: Mutex<Vec<TradePlan>>,
}

impl CollectingSink {
    fn take(&self) -> Vec<TradePlan> {
        self.plans
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }
}

#[async_trait]
impl AlertSink for CollectingSink {
    async fn send(&self, plan: &TradePlan) -> bool {
        match self.plans.lock() {
            Ok(mut plans) => {
                plans.push(plan.clone());
                true
            }
            Err(_) => false,
        }
    }
}

/// Feeds recorded frames through the live pipeline, using each frame's
/// timestamp as the evaluation clock.
pub struct ReplayRunner {
    scanner: Scanner,
    source: Arc<MemorySource>,
    sink: Arc<CollectingSink>,
}

impl ReplayRunner {
    pub fn new(cfg: &Config, store: Arc<dyn PlanStore>) -> Self {
        let source = Arc::new(MemorySource::new());
        let sink = Arc::new(CollectingSink::default());
        let scanner = Scanner::new(cfg, source.clone(), sink.clone(), store);
        Self {
            scanner,
            source,
            sink,
        }
    }

    pub fn load_frames(path: impl AsRef<Path>) -> Result<Vec<ReplayFrame>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let frames: Vec<ReplayFrame> = serde_json::from_str(&content)
            .with_context(|| format!("parsing frames in {}", path.display()))?;
        Ok(frames)
    }

    /// Frames are replayed in timestamp order; input order breaks ties.
    pub async fn run(&mut self, frames: &[ReplayFrame]) -> ReplayReport {
        let mut ordered: Vec<&ReplayFrame> = frames.iter().collect();
        ordered.sort_by_key(|f| f.timestamp);

        info!("=== REPLAY START === {} frame(s)", ordered.len());

        let mut report = ReplayReport::default();
        let log_interval = (ordered.len() / 10).max(1);

        for (i, frame) in ordered.iter().enumerate() {
            self.source.clear();
            let mut symbols: Vec<String> = Vec::new();
            for snapshot in &frame.snapshots {
                if !symbols.contains(&snapshot.symbol) {
                    symbols.push(snapshot.symbol.clone());
                }
                self.source.set(snapshot.clone());
            }

            let cycle = self.scanner.run_symbols(&symbols, frame.timestamp).await;
            report.record_cycle(&cycle);

            if (i + 1) % log_interval == 0 {
                info!(
                    "  Progress: {}/{} | {} | Sent: {} | Suppressed: {}",
                    i + 1,
                    ordered.len(),
                    frame.timestamp.format("%Y-%m-%d %H:%M"),
                    report.sent,
                    report.suppressed
                );
            }
        }

        report.alerts = self.sink.take();
        info!("=== REPLAY COMPLETE ===");
        report
    }
}
