use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::LadderConfig;
use crate::models::{PriceLevels, Side};

/// Which level source wins when a plan is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPrecedence {
    /// Externally computed levels when supplied, else the meta-signal's, else the ladder.
    PreferExternal,
    /// Ignore external levels entirely.
    LadderOnly,
}

impl FromStr for LevelPrecedence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prefer_external" | "external" => Ok(LevelPrecedence::PreferExternal),
            "ladder_only" | "ladder" => Ok(LevelPrecedence::LadderOnly),
            other => Err(format!("unknown level precedence '{}'", other)),
        }
    }
}

impl fmt::Display for LevelPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelPrecedence::PreferExternal => write!(f, "prefer_external"),
            LevelPrecedence::LadderOnly => write!(f, "ladder_only"),
        }
    }
}

/// Derives entry/stop/targets from a reference price. Replace the default
/// ladder with an ATR- or structure-based implementation where needed.
pub trait LevelStrategy: Send + Sync {
    fn levels(&self, side: Side, price: f64) -> PriceLevels;

    fn name(&self) -> &str;
}

/// Fixed percentage offsets from entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLadder {
    pub tp_pcts: [f64; 3],
    pub sl_pct: f64,
}

impl FixedLadder {
    pub fn new(cfg: &LadderConfig) -> Self {
        Self {
            tp_pcts: cfg.tp_pcts,
            sl_pct: cfg.sl_pct,
        }
    }
}

impl Default for FixedLadder {
    fn default() -> Self {
        Self::new(&LadderConfig::default())
    }
}

impl LevelStrategy for FixedLadder {
    fn levels(&self, side: Side, price: f64) -> PriceLevels {
        let s = side.sign();
        PriceLevels {
            entry: price,
            stop_loss: price * (1.0 - s * self.sl_pct),
            tp1: price * (1.0 + s * self.tp_pcts[0]),
            tp2: Some(price * (1.0 + s * self.tp_pcts[1])),
            tp3: Some(price * (1.0 + s * self.tp_pcts[2])),
        }
    }

    fn name(&self) -> &str {
        "fixed_ladder"
    }
}

/// Smallest risk distance used as a divisor.
pub const MIN_RISK_DISTANCE: f64 = 1e-9;

/// Reward-to-risk of the first target. Reward is floored at zero, so a target
/// on the wrong side of entry yields 0 rather than a negative ratio.
pub fn risk_reward(side: Side, entry: f64, stop_loss: f64, tp1: f64) -> f64 {
    let (risk, reward) = match side {
        Side::Long => (entry - stop_loss, tp1 - entry),
        Side::Short => (stop_loss - entry, entry - tp1),
    };
    reward.max(0.0) / risk.max(MIN_RISK_DISTANCE)
}
