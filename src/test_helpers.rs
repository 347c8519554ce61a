use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::core::trade_plan::TradePlan;
use crate::models::{AnalysisGroup, Direction, GroupSignal, RiskLevel, Side, Timeframe};

/// Fixed clock used across unit tests.
pub fn test_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-17T13:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Build group inputs from (group, direction, confidence, strength) tuples, in order.
pub fn signals(data: &[(&str, Direction, f64, f64)]) -> Vec<(AnalysisGroup, GroupSignal)> {
    data.iter()
        .map(|&(g, d, c, s)| (AnalysisGroup::from(g), GroupSignal::new(d, c, s)))
        .collect()
}

/// A plan with ladder-style levels around `entry` (-1% stop, +2% tp1 for longs).
pub fn sample_plan(symbol: &str, side: Side, entry: f64) -> TradePlan {
    let s = side.sign();
    TradePlan {
        symbol: symbol.to_string(),
        side,
        entry,
        stop_loss: entry * (1.0 - s * 0.01),
        tp1: entry * (1.0 + s * 0.02),
        tp2: Some(entry * (1.0 + s * 0.04)),
        tp3: Some(entry * (1.0 + s * 0.06)),
        rr_ratio: 2.0,
        confidence: 80.0,
        confluence_score: 80.0,
        risk_score: 0.3,
        risk_level: RiskLevel::Low,
        timeframes: vec![Timeframe::H1, Timeframe::H4],
        reason_summary: "test plan".to_string(),
        group_breakdown: Vec::new(),
        created_at: test_time().timestamp(),
    }
}

/// A Config suitable for testing: defaults, no webhook, temp log dir.
pub fn default_test_config() -> Config {
    Config {
        alert_webhook_url: None,
        log_dir: std::env::temp_dir()
            .join("signal_consensus_test")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
        ..Config::default()
    }
}
