#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use signal_consensus_bot::alerts::{AlertSink, PlanStore};
use signal_consensus_bot::config::Config;
use signal_consensus_bot::core::TradePlan;
use signal_consensus_bot::models::{
    AnalysisGroup, Direction, GroupSignal, InstrumentSnapshot, RiskAssessment,
};
use signal_consensus_bot::sources::SignalSource;

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-17T13:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

/// Defaults with the given instruments and a per-test temp log dir.
pub fn test_config(name: &str, instruments: &[&str]) -> Config {
    let dir = std::env::temp_dir().join(format!("signal_consensus_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    Config {
        instruments: instruments.iter().map(|s| s.to_string()).collect(),
        log_dir: dir.to_string_lossy().to_string(),
        log_level: "ERROR".to_string(),
        ..Config::default()
    }
}

/// Snapshot from (group, direction, confidence, strength) tuples.
pub fn snapshot(
    symbol: &str,
    price: f64,
    groups: &[(&str, Direction, f64, f64)],
) -> InstrumentSnapshot {
    InstrumentSnapshot {
        symbol: symbol.to_string(),
        current_price: Some(price),
        signals: groups
            .iter()
            .map(|&(g, d, c, s)| (AnalysisGroup::from(g), GroupSignal::new(d, c, s)))
            .collect(),
        levels: None,
        risk: RiskAssessment {
            risk_score: 0.3,
            factors: vec!["volatility normal".to_string()],
        },
    }
}

/// Three agreeing groups, enough for a plan that clears every default floor.
pub fn agreeing(symbol: &str, price: f64, direction: Direction) -> InstrumentSnapshot {
    snapshot(
        symbol,
        price,
        &[
            ("technical", direction, 80.0, 85.0),
            ("sentiment", direction, 75.0, 70.0),
            ("ml", direction, 78.0, 80.0),
        ],
    )
}

/// Source backed by a map; symbols listed in `failing` return an error.
#[derive(Default)]
pub struct MockSource {
    pub snapshots: Mutex<HashMap<String, InstrumentSnapshot>>,
    pub failing: Vec<String>,
}

impl MockSource {
    pub fn with(snapshots: Vec<InstrumentSnapshot>, failing: &[&str]) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().map(|s| (s.symbol.clone(), s)).collect()),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn set(&self, snapshot: InstrumentSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.symbol.clone(), snapshot);
    }
}

#[async_trait]
impl SignalSource for MockSource {
    async fn fetch(&self, symbol: &str) -> Result<InstrumentSnapshot> {
        if self.failing.iter().any(|s| s == symbol) {
            bail!("upstream timeout for {}", symbol);
        }
        match self.snapshots.lock().unwrap().get(symbol) {
            Some(s) => Ok(s.clone()),
            None => bail!("no data for {}", symbol),
        }
    }
}

/// Records every plan; reports delivery as `deliver`.
pub struct RecordingSink {
    pub plans: Mutex<Vec<TradePlan>>,
    pub deliver: bool,
}

impl RecordingSink {
    pub fn new(deliver: bool) -> Self {
        Self {
            plans: Mutex::new(Vec::new()),
            deliver,
        }
    }

    pub fn count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, plan: &TradePlan) -> bool {
        self.plans.lock().unwrap().push(plan.clone());
        self.deliver
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub records: Mutex<Vec<(String, bool, DateTime<Utc>)>>,
}

impl PlanStore for RecordingStore {
    fn persist(&self, symbol: &str, _plan: &TradePlan, sent: bool, timestamp: DateTime<Utc>) {
        self.records
            .lock()
            .unwrap()
            .push((symbol.to_string(), sent, timestamp));
    }
}
