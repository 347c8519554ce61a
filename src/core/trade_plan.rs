use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, PlanConfig};
use crate::core::consensus::MetaSignal;
use crate::core::levels::{risk_reward, FixedLadder, LevelPrecedence, LevelStrategy};
use crate::core::reasoning;
use crate::models::{AnalysisGroup, Direction, PriceLevels, RiskAssessment, RiskLevel, Side, Timeframe};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    pub group: AnalysisGroup,
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
}

/// A fully specified, risk-filtered recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    #[serde(default)]
    pub tp2: Option<f64>,
    #[serde(default)]
    pub tp3: Option<f64>,
    pub rr_ratio: f64,
    pub confidence: f64,
    pub confluence_score: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
    #[serde(default)]
    pub reason_summary: String,
    #[serde(default)]
    pub group_breakdown: Vec<GroupBreakdown>,
    /// Unix seconds
    pub created_at: i64,
}

impl TradePlan {
    pub fn levels(&self) -> PriceLevels {
        PriceLevels {
            entry: self.entry,
            stop_loss: self.stop_loss,
            tp1: self.tp1,
            tp2: self.tp2,
            tp3: self.tp3,
        }
    }
}

/// Why no plan was produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanRejection {
    #[error("neutral consensus")]
    NeutralDirection,
    #[error("confidence {confidence:.1} below {min:.1}")]
    LowConfidence { confidence: f64, min: f64 },
    #[error("risk score {risk_score:.2} above {max:.2}")]
    RiskTooHigh { risk_score: f64, max: f64 },
    #[error("no usable price levels")]
    NoLevels,
    #[error("risk/reward {rr:.2} below {min:.2}")]
    LowRiskReward { rr: f64, min: f64 },
    #[error("structurally invalid: {0}")]
    Structural(String),
}

impl PlanRejection {
    /// Stable short label, used for counters.
    pub fn label(&self) -> &'static str {
        match self {
            PlanRejection::NeutralDirection => "neutral",
            PlanRejection::LowConfidence { .. } => "low_confidence",
            PlanRejection::RiskTooHigh { .. } => "risk_too_high",
            PlanRejection::NoLevels => "no_levels",
            PlanRejection::LowRiskReward { .. } => "low_rr",
            PlanRejection::Structural(_) => "structural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    External,
    Consensus,
    Strategy,
}

impl fmt::Display for LevelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSource::External => write!(f, "external"),
            LevelSource::Consensus => write!(f, "consensus"),
            LevelSource::Strategy => write!(f, "strategy"),
        }
    }
}

pub struct TradePlanBuilder {
    cfg: PlanConfig,
    level_strategy: Arc<dyn LevelStrategy>,
}

impl TradePlanBuilder {
    pub fn new(cfg: &Config) -> Self {
        Self {
            cfg: cfg.plan.clone(),
            level_strategy: Arc::new(FixedLadder::new(&cfg.ladder)),
        }
    }

    pub fn with_level_strategy(mut self, strategy: Arc<dyn LevelStrategy>) -> Self {
        self.level_strategy = strategy;
        self
    }

    /// Builds a plan or returns `None`, logging why.
    pub fn build(
        &self,
        symbol: &str,
        current_price: f64,
        meta: &MetaSignal,
        levels_override: Option<&PriceLevels>,
        risk: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> Option<TradePlan> {
        match self.evaluate(symbol, current_price, meta, levels_override, risk, now) {
            Ok(plan) => Some(plan),
            Err(reason) => {
                debug!("{}: plan rejected: {}", symbol, reason);
                None
            }
        }
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        current_price: f64,
        meta: &MetaSignal,
        levels_override: Option<&PriceLevels>,
        risk: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> Result<TradePlan, PlanRejection> {
        let side = meta.direction.to_side().ok_or(PlanRejection::NeutralDirection)?;

        if meta.confidence < self.cfg.min_confidence {
            return Err(PlanRejection::LowConfidence {
                confidence: meta.confidence,
                min: self.cfg.min_confidence,
            });
        }

        if !risk.risk_score.is_finite() || risk.risk_score > self.cfg.max_risk_score {
            return Err(PlanRejection::RiskTooHigh {
                risk_score: risk.risk_score,
                max: self.cfg.max_risk_score,
            });
        }

        let (levels, source) = self
            .resolve_levels(side, current_price, meta, levels_override)
            .ok_or(PlanRejection::NoLevels)?;

        let rr = risk_reward(side, levels.entry, levels.stop_loss, levels.tp1);
        if !(rr >= self.cfg.min_rr) {
            return Err(PlanRejection::LowRiskReward {
                rr,
                min: self.cfg.min_rr,
            });
        }

        validate_structure(side, &levels)?;

        let risk_score = risk.risk_score.clamp(0.0, 1.0);
        let confluence_score = if meta.group_count > 0 {
            meta.supporting_groups.len() as f64 / meta.group_count as f64 * 100.0
        } else {
            0.0
        };

        let source_label = match source {
            LevelSource::Strategy => self.level_strategy.name().to_string(),
            other => other.to_string(),
        };
        debug!(
            "{}: {} plan from {} levels, rr={:.2} risk={:.2}",
            symbol, side, source_label, rr, risk_score
        );

        Ok(TradePlan {
            symbol: symbol.to_string(),
            side,
            entry: levels.entry,
            stop_loss: levels.stop_loss,
            tp1: levels.tp1,
            tp2: levels.tp2,
            tp3: levels.tp3,
            rr_ratio: rr,
            confidence: meta.confidence.clamp(0.0, 100.0),
            confluence_score,
            risk_score,
            risk_level: self.risk_level(risk_score),
            timeframes: self.cfg.timeframes.clone(),
            reason_summary: reasoning::reason_summary(meta),
            group_breakdown: reasoning::group_breakdown(meta),
            created_at: now.timestamp(),
        })
    }

    pub fn risk_level(&self, risk_score: f64) -> RiskLevel {
        if risk_score <= self.cfg.risk_low_max {
            RiskLevel::Low
        } else if risk_score <= self.cfg.risk_medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    fn resolve_levels(
        &self,
        side: Side,
        current_price: f64,
        meta: &MetaSignal,
        levels_override: Option<&PriceLevels>,
    ) -> Option<(PriceLevels, LevelSource)> {
        if self.cfg.level_precedence == LevelPrecedence::PreferExternal {
            if let Some(lv) = levels_override {
                return Some((*lv, LevelSource::External));
            }
        }
        if let Some(lv) = meta.levels() {
            return Some((lv, LevelSource::Consensus));
        }
        if current_price.is_finite() && current_price > 0.0 {
            return Some((self.level_strategy.levels(side, current_price), LevelSource::Strategy));
        }
        None
    }
}

/// Final check: every level positive and on the correct side of entry.
pub fn validate_structure(side: Side, levels: &PriceLevels) -> Result<(), PlanRejection> {
    let all = [Some(levels.entry), Some(levels.stop_loss), Some(levels.tp1), levels.tp2, levels.tp3];
    if all.iter().flatten().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(PlanRejection::Structural("non-positive or non-finite level".to_string()));
    }

    let s = side.sign();
    if (levels.entry - levels.stop_loss) * s <= 0.0 {
        return Err(PlanRejection::Structural(format!(
            "{} stop {:.4} not beyond entry {:.4}",
            side, levels.stop_loss, levels.entry
        )));
    }
    for (label, tp) in [("tp1", Some(levels.tp1)), ("tp2", levels.tp2), ("tp3", levels.tp3)] {
        if let Some(tp) = tp {
            if (tp - levels.entry) * s <= 0.0 {
                return Err(PlanRejection::Structural(format!(
                    "{} {} {:.4} on wrong side of entry {:.4}",
                    side, label, tp, levels.entry
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consensus::ConsensusEngine;
    use crate::models::Action;
    use crate::test_helpers::{default_test_config, signals, test_time};

    fn bullish_meta(price: Option<f64>) -> MetaSignal {
        let input = signals(&[
            ("technical", Direction::Long, 90.0, 80.0),
            ("sentiment", Direction::Long, 75.0, 70.0),
            ("ml", Direction::Long, 85.0, 75.0),
            ("onchain", Direction::Long, 80.0, 60.0),
            ("risk", Direction::Long, 70.0, 60.0),
        ]);
        ConsensusEngine::new(&default_test_config())
            .interpret("BTC-USD", &input, price)
            .unwrap()
    }

    fn builder() -> TradePlanBuilder {
        TradePlanBuilder::new(&default_test_config())
    }

    fn low_risk() -> RiskAssessment {
        RiskAssessment {
            risk_score: 0.2,
            factors: Vec::new(),
        }
    }

    #[test]
    fn builds_from_consensus_levels() {
        let meta = bullish_meta(Some(100.0));
        let plan = builder()
            .evaluate("BTC-USD", 100.0, &meta, None, &low_risk(), test_time())
            .unwrap();

        assert_eq!(plan.side, Side::Long);
        assert!((plan.stop_loss - 99.0).abs() < 1e-9);
        assert!((plan.tp1 - 102.0).abs() < 1e-9);
        assert!((plan.rr_ratio - 2.0).abs() < 1e-9);
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert_eq!(plan.confluence_score, 100.0);
        assert_eq!(plan.created_at, test_time().timestamp());
        assert_eq!(plan.group_breakdown.len(), 5);
        assert!(plan.reason_summary.contains("technical"));
    }

    #[test]
    fn rejects_neutral() {
        let mut meta = bullish_meta(None);
        meta.direction = Direction::Neutral;
        meta.recommended_action = Action::Hold;
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, None, &low_risk(), test_time())
            .unwrap_err();
        assert_eq!(err, PlanRejection::NeutralDirection);
        assert!(builder()
            .build("BTC-USD", 100.0, &meta, None, &low_risk(), test_time())
            .is_none());
    }

    #[test]
    fn rejects_low_confidence() {
        let mut meta = bullish_meta(None);
        meta.confidence = 40.0;
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, None, &low_risk(), test_time())
            .unwrap_err();
        assert!(matches!(err, PlanRejection::LowConfidence { .. }));
    }

    #[test]
    fn rejects_high_risk() {
        let meta = bullish_meta(None);
        let risk = RiskAssessment {
            risk_score: 0.9,
            factors: vec!["funding spike".to_string()],
        };
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, None, &risk, test_time())
            .unwrap_err();
        assert!(matches!(err, PlanRejection::RiskTooHigh { .. }));
    }

    #[test]
    fn rejects_poor_rr_from_external_levels() {
        let meta = bullish_meta(None);
        let lv = PriceLevels {
            entry: 100.0,
            stop_loss: 95.0,
            tp1: 103.0,
            tp2: None,
            tp3: None,
        };
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, Some(&lv), &low_risk(), test_time())
            .unwrap_err();
        assert!(matches!(err, PlanRejection::LowRiskReward { .. }));
    }

    #[test]
    fn wrong_side_target_floors_rr_to_zero() {
        let meta = bullish_meta(None);
        let lv = PriceLevels {
            entry: 100.0,
            stop_loss: 98.0,
            tp1: 97.0,
            tp2: None,
            tp3: None,
        };
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, Some(&lv), &low_risk(), test_time())
            .unwrap_err();
        assert_eq!(err, PlanRejection::LowRiskReward { rr: 0.0, min: 1.5 });
    }

    #[test]
    fn stop_on_wrong_side_is_structural() {
        let meta = bullish_meta(None);
        let lv = PriceLevels {
            entry: 100.0,
            stop_loss: 101.0,
            tp1: 110.0,
            tp2: None,
            tp3: None,
        };
        let err = builder()
            .evaluate("BTC-USD", 100.0, &meta, Some(&lv), &low_risk(), test_time())
            .unwrap_err();
        assert!(matches!(err, PlanRejection::Structural(_)));
    }

    #[test]
    fn external_levels_win_when_preferred() {
        let meta = bullish_meta(Some(100.0));
        let lv = PriceLevels {
            entry: 100.5,
            stop_loss: 97.0,
            tp1: 108.0,
            tp2: Some(112.0),
            tp3: None,
        };
        let plan = builder()
            .evaluate("BTC-USD", 100.0, &meta, Some(&lv), &low_risk(), test_time())
            .unwrap();
        assert_eq!(plan.entry, 100.5);
        assert_eq!(plan.tp2, Some(112.0));
        assert_eq!(plan.tp3, None);
    }

    #[test]
    fn ladder_only_ignores_external_levels() {
        let mut cfg = default_test_config();
        cfg.plan.level_precedence = LevelPrecedence::LadderOnly;
        let meta = bullish_meta(None);
        let lv = PriceLevels {
            entry: 100.5,
            stop_loss: 97.0,
            tp1: 108.0,
            tp2: None,
            tp3: None,
        };
        let plan = TradePlanBuilder::new(&cfg)
            .evaluate("BTC-USD", 200.0, &meta, Some(&lv), &low_risk(), test_time())
            .unwrap();
        assert_eq!(plan.entry, 200.0);
        assert!((plan.tp1 - 204.0).abs() < 1e-9);
    }

    struct WideLadder;

    impl LevelStrategy for WideLadder {
        fn levels(&self, side: Side, price: f64) -> PriceLevels {
            let s = side.sign();
            PriceLevels {
                entry: price,
                stop_loss: price * (1.0 - s * 0.02),
                tp1: price * (1.0 + s * 0.06),
                tp2: None,
                tp3: None,
            }
        }

        fn name(&self) -> &str {
            "wide_ladder"
        }
    }

    #[test]
    fn custom_strategy_supplies_levels_without_meta_levels() {
        let meta = bullish_meta(None);
        let b = builder().with_level_strategy(Arc::new(WideLadder));
        let plan = b
            .evaluate("BTC-USD", 100.0, &meta, None, &low_risk(), test_time())
            .unwrap();
        assert!((plan.stop_loss - 98.0).abs() < 1e-9);
        assert!((plan.rr_ratio - 3.0).abs() < 1e-9);
        assert_eq!(plan.tp2, None);
        assert_eq!(b.level_strategy.name(), "wide_ladder");
    }

    #[test]
    fn no_price_and_no_levels_is_rejected() {
        let meta = bullish_meta(None);
        let err = builder()
            .evaluate("BTC-USD", f64::NAN, &meta, None, &low_risk(), test_time())
            .unwrap_err();
        assert_eq!(err, PlanRejection::NoLevels);
    }

    #[test]
    fn risk_buckets() {
        let b = builder();
        assert_eq!(b.risk_level(0.0), RiskLevel::Low);
        assert_eq!(b.risk_level(0.35), RiskLevel::Low);
        assert_eq!(b.risk_level(0.36), RiskLevel::Medium);
        assert_eq!(b.risk_level(0.65), RiskLevel::Medium);
        assert_eq!(b.risk_level(0.66), RiskLevel::High);
    }

    #[test]
    fn short_structure() {
        let ok = PriceLevels {
            entry: 100.0,
            stop_loss: 101.0,
            tp1: 98.0,
            tp2: Some(96.0),
            tp3: Some(94.0),
        };
        assert!(validate_structure(Side::Short, &ok).is_ok());

        let bad_tp3 = PriceLevels { tp3: Some(100.5), ..ok };
        assert!(validate_structure(Side::Short, &bad_tp3).is_err());

        let negative = PriceLevels { tp1: -1.0, ..ok };
        assert!(validate_structure(Side::Short, &negative).is_err());
    }

    #[test]
    fn plan_json_round_trip() {
        let meta = bullish_meta(Some(43_210.55));
        let plan = builder()
            .evaluate("BTC-USD", 43_210.55, &meta, None, &low_risk(), test_time())
            .unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: TradePlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
