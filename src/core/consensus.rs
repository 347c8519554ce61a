use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{Config, ConsensusConfig, GroupWeights};
use crate::core::levels::{risk_reward, FixedLadder, LevelStrategy};
use crate::models::{
    Action, AnalysisGroup, Direction, DivergenceKind, GroupSignal, PriceLevels,
};

/// Scores closer than this are a tie.
const SCORE_EPSILON: f64 = 1e-9;

/// A valid group input after weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupVote {
    pub group: AnalysisGroup,
    pub direction: Direction,
    pub confidence: f64,
    pub strength: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub group: AnalysisGroup,
    pub kind: DivergenceKind,
    pub direction: Direction,
    pub confidence: f64,
}

/// Fused view of all group opinions for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSignal {
    pub symbol: String,
    pub direction: Direction,
    pub consensus_strength: f64,
    pub confidence: f64,
    pub recommended_action: Action,
    #[serde(default)]
    pub entry: Option<f64>,
    #[serde(default)]
    pub targets: Vec<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub risk_reward: Option<f64>,
    #[serde(default)]
    pub supporting_groups: Vec<AnalysisGroup>,
    #[serde(default)]
    pub opposing_groups: Vec<AnalysisGroup>,
    #[serde(default)]
    pub neutral_groups: Vec<AnalysisGroup>,
    #[serde(default)]
    pub divergences: Vec<Divergence>,
    #[serde(default)]
    pub votes: Vec<GroupVote>,
    pub group_count: usize,
    pub analysis_complete: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl MetaSignal {
    /// Levels attached by the engine, if it computed any.
    pub fn levels(&self) -> Option<PriceLevels> {
        let entry = self.entry?;
        let stop_loss = self.stop_loss?;
        let tp1 = *self.targets.first()?;
        Some(PriceLevels {
            entry,
            stop_loss,
            tp1,
            tp2: self.targets.get(1).copied(),
            tp3: self.targets.get(2).copied(),
        })
    }
}

/// Not enough valid group inputs to form a consensus. Returned as data, never panics.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{symbol}: {reason}")]
pub struct ConsensusError {
    pub symbol: String,
    pub valid_count: usize,
    pub required: usize,
    pub reason: String,
}

impl From<ConsensusError> for MetaSignal {
    fn from(err: ConsensusError) -> Self {
        MetaSignal {
            symbol: err.symbol.clone(),
            direction: Direction::Neutral,
            consensus_strength: 0.0,
            confidence: 0.0,
            recommended_action: Action::Wait,
            entry: None,
            targets: Vec::new(),
            stop_loss: None,
            risk_reward: None,
            supporting_groups: Vec::new(),
            opposing_groups: Vec::new(),
            neutral_groups: Vec::new(),
            divergences: Vec::new(),
            votes: Vec::new(),
            group_count: err.valid_count,
            analysis_complete: false,
            error: Some(err.reason),
        }
    }
}

pub struct ConsensusEngine {
    weights: GroupWeights,
    cfg: ConsensusConfig,
    level_strategy: Arc<dyn LevelStrategy>,
}

impl ConsensusEngine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            weights: cfg.group_weights.clone(),
            cfg: cfg.consensus.clone(),
            level_strategy: Arc::new(FixedLadder::new(&cfg.ladder)),
        }
    }

    pub fn with_level_strategy(mut self, strategy: Arc<dyn LevelStrategy>) -> Self {
        self.level_strategy = strategy;
        self
    }

    pub fn level_strategy(&self) -> Arc<dyn LevelStrategy> {
        Arc::clone(&self.level_strategy)
    }

    /// Fuses group opinions into one meta-signal.
    ///
    /// Ties between direction scores resolve LONG > SHORT > NEUTRAL. With three
    /// fixed directions the priority order always settles a tie, so group input
    /// order never influences the winner; it only fixes the order of the
    /// group lists in the result.
    pub fn interpret(
        &self,
        symbol: &str,
        signals: &[(AnalysisGroup, GroupSignal)],
        current_price: Option<f64>,
    ) -> Result<MetaSignal, ConsensusError> {
        let votes = self.collect_votes(symbol, signals);

        if votes.len() < self.cfg.min_groups_required {
            debug!(
                "{}: {} valid group(s), {} required",
                symbol,
                votes.len(),
                self.cfg.min_groups_required
            );
            return Err(ConsensusError {
                symbol: symbol.to_string(),
                valid_count: votes.len(),
                required: self.cfg.min_groups_required,
                reason: format!(
                    "insufficient groups: {} valid, {} required",
                    votes.len(),
                    self.cfg.min_groups_required
                ),
            });
        }

        // Step 1: weighted vote
        let mut scores = [0.0f64; 3];
        for v in &votes {
            scores[priority_index(v.direction)] += v.weight * v.confidence;
        }

        // Step 2: winner with fixed priority tie-break
        let mut winner = Direction::PRIORITY[0];
        let mut best = scores[0];
        for (i, &dir) in Direction::PRIORITY.iter().enumerate().skip(1) {
            if scores[i] > best + SCORE_EPSILON {
                winner = dir;
                best = scores[i];
            }
        }

        let total_weight: f64 = votes.iter().map(|v| v.weight).sum();

        // Step 3: share of the theoretical maximum
        let consensus_strength = if total_weight > 0.0 {
            (best / (total_weight * 100.0) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        // Group buckets
        let opposite = winner.opposite();
        let mut supporting = Vec::new();
        let mut opposing = Vec::new();
        let mut neutral = Vec::new();
        for v in &votes {
            if v.direction == winner {
                supporting.push(v.group.clone());
            } else if v.direction == Direction::Neutral {
                neutral.push(v.group.clone());
            } else {
                opposing.push(v.group.clone());
            }
        }
        let strictly_opposing = votes
            .iter()
            .filter(|v| Some(v.direction) == opposite)
            .count();

        // Step 4: aggregate confidence
        let mut confidence = if total_weight > 0.0 {
            votes.iter().map(|v| v.weight * v.confidence).sum::<f64>() / total_weight
        } else {
            0.0
        };
        if supporting.len() == votes.len() {
            confidence *= self.cfg.unanimity_boost;
        } else if strictly_opposing >= self.cfg.penalty_min_opposing {
            confidence *= self.cfg.divergence_penalty;
        }
        let confidence = confidence.clamp(0.0, 100.0);

        // Step 5: divergences, opposite ones first
        let mut divergences = Vec::new();
        if winner.is_directional() {
            for v in votes.iter().filter(|v| Some(v.direction) == opposite) {
                divergences.push(Divergence {
                    group: v.group.clone(),
                    kind: DivergenceKind::OppositeDirection,
                    direction: v.direction,
                    confidence: v.confidence,
                });
            }
            for v in votes.iter().filter(|v| v.direction == Direction::Neutral) {
                divergences.push(Divergence {
                    group: v.group.clone(),
                    kind: DivergenceKind::NeutralDivergence,
                    direction: v.direction,
                    confidence: v.confidence,
                });
            }
        }

        // Step 6: action
        let recommended_action = self.recommend(winner, consensus_strength, confidence, divergences.len());

        let mut meta = MetaSignal {
            symbol: symbol.to_string(),
            direction: winner,
            consensus_strength,
            confidence,
            recommended_action,
            entry: None,
            targets: Vec::new(),
            stop_loss: None,
            risk_reward: None,
            supporting_groups: supporting,
            opposing_groups: opposing,
            neutral_groups: neutral,
            divergences,
            group_count: votes.len(),
            votes,
            analysis_complete: true,
            error: None,
        };

        // Step 7: levels
        if let (Some(side), Some(price)) = (winner.to_side(), current_price) {
            if price.is_finite() && price > 0.0 {
                let lv = self.level_strategy.levels(side, price);
                meta.entry = Some(lv.entry);
                meta.stop_loss = Some(lv.stop_loss);
                meta.targets = std::iter::once(lv.tp1).chain(lv.tp2).chain(lv.tp3).collect();
                meta.risk_reward = Some(risk_reward(side, lv.entry, lv.stop_loss, lv.tp1));
            }
        }

        debug!(
            "{}: {} strength={:.1} conf={:.1} action={} divergences={}",
            symbol,
            meta.direction,
            meta.consensus_strength,
            meta.confidence,
            meta.recommended_action,
            meta.divergences.len()
        );

        Ok(meta)
    }

    fn collect_votes(&self, symbol: &str, signals: &[(AnalysisGroup, GroupSignal)]) -> Vec<GroupVote> {
        let mut seen = HashSet::new();
        let mut votes = Vec::with_capacity(signals.len());
        for (group, signal) in signals {
            if !seen.insert(group.clone()) {
                trace!("{}: duplicate {} signal ignored", symbol, group);
                continue;
            }
            let Some((direction, confidence)) = signal.vote() else {
                trace!("{}: {} signal missing direction or confidence", symbol, group);
                continue;
            };
            votes.push(GroupVote {
                group: group.clone(),
                direction,
                confidence,
                strength: signal.strength.clamp(0.0, 100.0),
                weight: self.weights.weight(group),
            });
        }
        votes
    }

    fn recommend(&self, winner: Direction, strength: f64, confidence: f64, divergences: usize) -> Action {
        let actionable = strength >= self.cfg.action_min_strength
            && confidence >= self.cfg.action_min_confidence
            && divergences <= self.cfg.action_max_divergences;
        match winner {
            Direction::Neutral => Action::Hold,
            _ if !actionable => Action::Wait,
            Direction::Long => Action::Buy,
            Direction::Short => Action::Sell,
        }
    }
}

fn priority_index(direction: Direction) -> usize {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
        Direction::Neutral => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{default_test_config, signals};

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(&default_test_config())
    }

    #[test]
    fn mixed_lean_waits() {
        let input = signals(&[
            ("technical", Direction::Long, 78.0, 82.0),
            ("sentiment", Direction::Long, 65.0, 70.0),
            ("ml", Direction::Long, 72.0, 68.0),
            ("onchain", Direction::Neutral, 55.0, 50.0),
            ("risk", Direction::Short, 60.0, 65.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();

        assert_eq!(meta.direction, Direction::Long);
        assert!((meta.consensus_strength - 50.5).abs() < 1e-9);
        assert!((meta.confidence - 67.75).abs() < 1e-9);
        assert_eq!(meta.recommended_action, Action::Wait);
        assert_eq!(meta.divergences.len(), 2);
        assert_eq!(meta.divergences[0].group, AnalysisGroup::Risk);
        assert_eq!(meta.divergences[0].kind, DivergenceKind::OppositeDirection);
        assert_eq!(meta.divergences[1].group, AnalysisGroup::Onchain);
        assert_eq!(meta.divergences[1].kind, DivergenceKind::NeutralDivergence);
        assert_eq!(meta.supporting_groups.len(), 3);
        assert_eq!(meta.opposing_groups, vec![AnalysisGroup::Risk]);
        assert_eq!(meta.neutral_groups, vec![AnalysisGroup::Onchain]);
        assert_eq!(meta.group_count, 5);
        assert!(meta.analysis_complete);
        assert!(meta.entry.is_none());
    }

    #[test]
    fn unanimous_long_buys_with_boost() {
        let input = signals(&[
            ("technical", Direction::Long, 90.0, 80.0),
            ("sentiment", Direction::Long, 75.0, 70.0),
            ("ml", Direction::Long, 85.0, 75.0),
            ("onchain", Direction::Long, 80.0, 60.0),
            ("risk", Direction::Long, 70.0, 60.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();

        assert!((meta.consensus_strength - 81.25).abs() < 1e-9);
        assert!((meta.confidence - 97.5).abs() < 1e-9);
        assert!(meta.divergences.is_empty());
        assert_eq!(meta.recommended_action, Action::Buy);
    }

    #[test]
    fn boost_is_clamped_to_100() {
        let input = signals(&[
            ("technical", Direction::Short, 95.0, 80.0),
            ("sentiment", Direction::Short, 95.0, 70.0),
            ("ml", Direction::Short, 95.0, 75.0),
        ]);
        let meta = engine().interpret("ETH-USD", &input, None).unwrap();
        assert_eq!(meta.confidence, 100.0);
        assert_eq!(meta.recommended_action, Action::Sell);
    }

    #[test]
    fn two_opposing_groups_apply_penalty_once() {
        let input = signals(&[
            ("technical", Direction::Long, 90.0, 80.0),
            ("ml", Direction::Long, 90.0, 80.0),
            ("sentiment", Direction::Short, 50.0, 50.0),
            ("risk", Direction::Short, 50.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        // weighted avg = (22.5 + 22.5 + 10 + 7.5) / 0.85
        let expected = (22.5 + 22.5 + 10.0 + 7.5) / 0.85 * 0.8;
        assert_eq!(meta.direction, Direction::Long);
        assert!((meta.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn single_opposing_group_is_not_penalized() {
        let input = signals(&[
            ("technical", Direction::Long, 80.0, 80.0),
            ("ml", Direction::Long, 80.0, 80.0),
            ("risk", Direction::Short, 40.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        let expected = (20.0 + 20.0 + 6.0) / 0.65;
        assert!((meta.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn tie_prefers_long_over_short() {
        let input = signals(&[
            ("technical", Direction::Short, 80.0, 50.0),
            ("ml", Direction::Long, 80.0, 50.0),
            ("onchain", Direction::Neutral, 10.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        assert_eq!(meta.direction, Direction::Long);

        // Same inputs, reversed order: same winner.
        let mut reversed = input.clone();
        reversed.reverse();
        let meta = engine().interpret("BTC-USD", &reversed, None).unwrap();
        assert_eq!(meta.direction, Direction::Long);
    }

    #[test]
    fn tie_prefers_short_over_neutral() {
        let input = signals(&[
            ("onchain", Direction::Neutral, 50.0, 50.0),
            ("risk", Direction::Short, 50.0, 50.0),
            ("ml", Direction::Long, 10.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        assert_eq!(meta.direction, Direction::Short);
    }

    #[test]
    fn neutral_winner_holds_without_levels() {
        let input = signals(&[
            ("technical", Direction::Neutral, 70.0, 50.0),
            ("ml", Direction::Neutral, 70.0, 50.0),
            ("sentiment", Direction::Long, 30.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, Some(100.0)).unwrap();
        assert_eq!(meta.direction, Direction::Neutral);
        assert_eq!(meta.recommended_action, Action::Hold);
        assert!(meta.divergences.is_empty());
        assert!(meta.entry.is_none());
        assert!(meta.levels().is_none());
    }

    #[test]
    fn insufficient_groups_is_data() {
        let mut input = signals(&[
            ("technical", Direction::Long, 70.0, 50.0),
            ("ml", Direction::Long, 70.0, 50.0),
        ]);
        input.push((
            AnalysisGroup::Sentiment,
            GroupSignal {
                direction: None,
                confidence: Some(80.0),
                strength: 10.0,
                levels: None,
            },
        ));
        let err = engine().interpret("SOL-USD", &input, None).unwrap_err();
        assert_eq!(err.valid_count, 2);
        assert_eq!(err.required, 3);

        let meta = MetaSignal::from(err);
        assert!(!meta.analysis_complete);
        assert!(meta.error.as_deref().unwrap().contains("insufficient"));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["analysis_complete"], false);
    }

    #[test]
    fn missing_groups_do_not_dilute_strength() {
        // Only three groups present: denominator is their weight sum (0.65), not 1.0.
        let input = signals(&[
            ("technical", Direction::Long, 80.0, 50.0),
            ("ml", Direction::Long, 80.0, 50.0),
            ("risk", Direction::Long, 80.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        assert!((meta.consensus_strength - 80.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_group_uses_fallback_weight() {
        let input = signals(&[
            ("technical", Direction::Long, 80.0, 50.0),
            ("orderflow", Direction::Long, 80.0, 50.0),
            ("ml", Direction::Long, 80.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        let vote = meta
            .votes
            .iter()
            .find(|v| v.group == AnalysisGroup::Other("orderflow".to_string()))
            .unwrap();
        assert_eq!(vote.weight, 0.20);
    }

    #[test]
    fn duplicate_group_keeps_first() {
        let input = signals(&[
            ("technical", Direction::Long, 80.0, 50.0),
            ("technical", Direction::Short, 99.0, 50.0),
            ("ml", Direction::Long, 80.0, 50.0),
            ("risk", Direction::Long, 80.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, None).unwrap();
        assert_eq!(meta.group_count, 3);
        assert!(meta.opposing_groups.is_empty());
    }

    #[test]
    fn attaches_ladder_levels_with_price() {
        let input = signals(&[
            ("technical", Direction::Short, 80.0, 50.0),
            ("ml", Direction::Short, 80.0, 50.0),
            ("risk", Direction::Short, 80.0, 50.0),
        ]);
        let meta = engine().interpret("BTC-USD", &input, Some(200.0)).unwrap();
        assert_eq!(meta.entry, Some(200.0));
        assert!((meta.stop_loss.unwrap() - 202.0).abs() < 1e-9);
        assert_eq!(meta.targets.len(), 3);
        assert!((meta.targets[0] - 196.0).abs() < 1e-9);
        assert!((meta.risk_reward.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_give_zero_scores() {
        let mut cfg = default_test_config();
        cfg.group_weights.technical = 0.0;
        cfg.group_weights.ml = 0.0;
        cfg.group_weights.risk = 0.0;
        let input = signals(&[
            ("technical", Direction::Long, 80.0, 50.0),
            ("ml", Direction::Long, 80.0, 50.0),
            ("risk", Direction::Long, 80.0, 50.0),
        ]);
        let meta = ConsensusEngine::new(&cfg).interpret("BTC-USD", &input, None).unwrap();
        assert_eq!(meta.consensus_strength, 0.0);
        assert_eq!(meta.confidence, 0.0);
        assert_eq!(meta.recommended_action, Action::Wait);
    }

    #[test]
    fn outputs_stay_in_bounds() {
        let dirs = [Direction::Long, Direction::Short, Direction::Neutral];
        let groups = ["technical", "sentiment", "ml", "onchain", "risk", "macro"];
        for seed in 0..200u32 {
            let input: Vec<(AnalysisGroup, GroupSignal)> = groups
                .iter()
                .enumerate()
                .map(|(i, g)| {
                    let k = seed.wrapping_mul(2654435761).wrapping_add(i as u32 * 97);
                    let dir = dirs[(k % 3) as usize];
                    let conf = (k % 101) as f64 * 1.3 - 10.0;
                    (AnalysisGroup::from(*g), GroupSignal::new(dir, conf, 50.0))
                })
                .collect();
            let meta = engine().interpret("X", &input, Some(10.0)).unwrap();
            assert!((0.0..=100.0).contains(&meta.consensus_strength));
            assert!((0.0..=100.0).contains(&meta.confidence));
        }
    }
}
