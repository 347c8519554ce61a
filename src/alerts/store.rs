use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::alerts::PlanStore;
use crate::core::trade_plan::TradePlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub symbol: String,
    pub sent: bool,
    /// Unix seconds
    pub timestamp: i64,
    pub plan: TradePlan,
}

/// Appends one JSON object per line to `<log_dir>/plan_history.jsonl`.
pub struct JsonlStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            path: log_dir.as_ref().join("plan_history.jsonl"),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every parseable record; unreadable lines are skipped.
    pub fn load(&self) -> Vec<PlanRecord> {
        fs::read_to_string(&self.path)
            .map(|content| {
                content
                    .lines()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn append(&self, record: &PlanRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl PlanStore for JsonlStore {
    fn persist(&self, symbol: &str, plan: &TradePlan, sent: bool, timestamp: DateTime<Utc>) {
        let record = PlanRecord {
            symbol: symbol.to_string(),
            sent,
            timestamp: timestamp.timestamp(),
            plan: plan.clone(),
        };
        if let Err(e) = self.append(&record) {
            warn!("{}: could not persist plan to {}: {}", symbol, self.path.display(), e);
        }
    }
}
