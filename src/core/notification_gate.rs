use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::config::{Config, GateConfig};
use crate::core::trade_plan::TradePlan;

/// What the gate remembers about one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationState {
    pub last_plan: TradePlan,
    pub sent_last_time: bool,
    pub last_considered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialChange {
    SideFlip,
    Entry,
    StopLoss,
    Tp1,
    Confidence,
    RiskReward,
}

impl fmt::Display for MaterialChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialChange::SideFlip => write!(f, "side flip"),
            MaterialChange::Entry => write!(f, "entry moved"),
            MaterialChange::StopLoss => write!(f, "stop moved"),
            MaterialChange::Tp1 => write!(f, "tp1 moved"),
            MaterialChange::Confidence => write!(f, "confidence up"),
            MaterialChange::RiskReward => write!(f, "rr up"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    BelowConfidence,
    BelowRiskReward,
    FirstPlan,
    Changed(MaterialChange),
    InsideCooldown,
    Unchanged,
}

impl GateDecision {
    pub fn should_send(&self) -> bool {
        matches!(self, GateDecision::FirstPlan | GateDecision::Changed(_))
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::BelowConfidence => write!(f, "confidence below alert floor"),
            GateDecision::BelowRiskReward => write!(f, "rr below alert floor"),
            GateDecision::FirstPlan => write!(f, "first plan"),
            GateDecision::Changed(change) => write!(f, "{}", change),
            GateDecision::InsideCooldown => write!(f, "no material change inside cooldown"),
            GateDecision::Unchanged => write!(f, "no material change"),
        }
    }
}

/// Per-instrument anti-spam gate. State is keyed by symbol and only `remember` mutates it.
///
/// Callers serialize access per instrument; the gate itself holds no locks.
pub struct NotificationGate {
    cfg: GateConfig,
    states: HashMap<String, NotificationState>,
}

impl NotificationGate {
    pub fn new(cfg: &Config) -> Self {
        Self::with_config(cfg.gate.clone())
    }

    pub fn with_config(cfg: GateConfig) -> Self {
        Self {
            cfg,
            states: HashMap::new(),
        }
    }

    pub fn should_notify(&self, symbol: &str, plan: &TradePlan, now: DateTime<Utc>) -> bool {
        self.decide(symbol, plan, now).should_send()
    }

    pub fn decide(&self, symbol: &str, plan: &TradePlan, now: DateTime<Utc>) -> GateDecision {
        if plan.confidence < self.cfg.min_conf_for_alert {
            return GateDecision::BelowConfidence;
        }
        if plan.rr_ratio < self.cfg.min_rr_for_alert {
            return GateDecision::BelowRiskReward;
        }

        let Some(state) = self.states.get(symbol) else {
            return GateDecision::FirstPlan;
        };

        let change = self.material_change(&state.last_plan, plan);

        // The cooldown only adds a requirement; outside it the same
        // material-change requirement still applies below.
        let elapsed = now - state.last_considered_at;
        let cooldown = i64::try_from(self.cfg.min_notify_interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        if elapsed < cooldown && change.is_none() {
            debug!("{}: suppressed, {}s since last evaluation", symbol, elapsed.num_seconds());
            return GateDecision::InsideCooldown;
        }

        match change {
            Some(c) => GateDecision::Changed(c),
            None => GateDecision::Unchanged,
        }
    }

    /// Records the outcome of an evaluation, sent or not.
    pub fn remember(&mut self, symbol: &str, plan: &TradePlan, sent: bool, now: DateTime<Utc>) {
        self.states.insert(
            symbol.to_string(),
            NotificationState {
                last_plan: plan.clone(),
                sent_last_time: sent,
                last_considered_at: now,
            },
        );
    }

    /// First material difference between two successive plans, if any.
    pub fn material_change(&self, old: &TradePlan, new: &TradePlan) -> Option<MaterialChange> {
        if old.side != new.side {
            return Some(MaterialChange::SideFlip);
        }
        let pct = self.cfg.min_level_change_pct;
        if level_moved(old.entry, new.entry, pct) {
            return Some(MaterialChange::Entry);
        }
        if level_moved(old.stop_loss, new.stop_loss, pct) {
            return Some(MaterialChange::StopLoss);
        }
        if level_moved(old.tp1, new.tp1, pct) {
            return Some(MaterialChange::Tp1);
        }
        if new.confidence - old.confidence >= self.cfg.min_conf_delta {
            return Some(MaterialChange::Confidence);
        }
        if new.rr_ratio - old.rr_ratio >= self.cfg.min_rr_delta {
            return Some(MaterialChange::RiskReward);
        }
        None
    }

    pub fn state(&self, symbol: &str) -> Option<&NotificationState> {
        self.states.get(symbol)
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    pub fn reset(&mut self, symbol: &str) -> bool {
        self.states.remove(symbol).is_some()
    }

    pub fn reset_all(&mut self) {
        self.states.clear();
    }
}

/// Relative move against the old level; a non-positive old level always counts as moved.
fn level_moved(old: f64, new: f64, min_pct: f64) -> bool {
    if old <= 0.0 {
        return true;
    }
    (new - old).abs() / old >= min_pct
}
