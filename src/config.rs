use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::levels::LevelPrecedence;
use crate::error::ConfigError;
use crate::models::{AnalysisGroup, Timeframe};

/// Longest accepted notification cooldown (one year).
pub const MAX_NOTIFY_INTERVAL_SECS: u64 = 365 * 24 * 3600;

pub type SharedConfig = Arc<RwLock<Config>>;

/// Vote weight per analysis group. `fallback` applies to groups outside the known set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWeights {
    pub technical: f64,
    pub sentiment: f64,
    pub ml: f64,
    pub onchain: f64,
    pub risk: f64,
    pub fallback: f64,
}

impl Default for GroupWeights {
    fn default() -> Self {
        Self {
            technical: 0.25,
            sentiment: 0.20,
            ml: 0.25,
            onchain: 0.15,
            risk: 0.15,
            fallback: 0.20,
        }
    }
}

impl GroupWeights {
    pub fn weight(&self, group: &AnalysisGroup) -> f64 {
        match group {
            AnalysisGroup::Technical => self.technical,
            AnalysisGroup::Sentiment => self.sentiment,
            AnalysisGroup::Ml => self.ml,
            AnalysisGroup::Onchain => self.onchain,
            AnalysisGroup::Risk => self.risk,
            AnalysisGroup::Other(_) => self.fallback,
        }
    }

    /// Parses `technical=0.25,sentiment=0.2,...,fallback=0.2`. Unlisted groups keep their default.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut weights = Self::default();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::parse("GROUP_WEIGHTS", pair, "expected name=weight"))?;
            let w: f64 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::parse("GROUP_WEIGHTS", pair, e))?;
            let slot = match name.trim().to_lowercase().as_str() {
                "fallback" => &mut weights.fallback,
                other => match AnalysisGroup::from(other) {
                    AnalysisGroup::Technical => &mut weights.technical,
                    AnalysisGroup::Sentiment => &mut weights.sentiment,
                    AnalysisGroup::Ml => &mut weights.ml,
                    AnalysisGroup::Onchain => &mut weights.onchain,
                    AnalysisGroup::Risk => &mut weights.risk,
                    AnalysisGroup::Other(_) => {
                        return Err(ConfigError::parse("GROUP_WEIGHTS", pair, "unknown group"))
                    }
                },
            };
            *slot = w;
        }
        Ok(weights)
    }

    fn all(&self) -> [(&'static str, f64); 6] {
        [
            ("technical", self.technical),
            ("sentiment", self.sentiment),
            ("ml", self.ml),
            ("onchain", self.onchain),
            ("risk", self.risk),
            ("fallback", self.fallback),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub min_groups_required: usize,
    // Action selection (BUY/SELL vs WAIT)
    pub action_min_strength: f64,
    pub action_min_confidence: f64,
    pub action_max_divergences: usize,
    // Confidence adjustment
    pub unanimity_boost: f64,
    pub divergence_penalty: f64,
    pub penalty_min_opposing: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_groups_required: 3,
            action_min_strength: 60.0,
            action_min_confidence: 70.0,
            action_max_divergences: 1,
            unanimity_boost: 1.2,
            divergence_penalty: 0.8,
            penalty_min_opposing: 2,
        }
    }
}

/// Fixed-percentage target ladder, as fractions of the entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    pub tp_pcts: [f64; 3],
    pub sl_pct: f64,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            tp_pcts: [0.02, 0.04, 0.06],
            sl_pct: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub min_confidence: f64,
    pub max_risk_score: f64,
    pub min_rr: f64,
    pub risk_low_max: f64,
    pub risk_medium_max: f64,
    pub level_precedence: LevelPrecedence,
    pub timeframes: Vec<Timeframe>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            min_confidence: 60.0,
            max_risk_score: 0.7,
            min_rr: 1.5,
            risk_low_max: 0.35,
            risk_medium_max: 0.65,
            level_precedence: LevelPrecedence::PreferExternal,
            timeframes: vec![Timeframe::H1, Timeframe::H4],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub min_conf_for_alert: f64,
    pub min_rr_for_alert: f64,
    pub min_notify_interval_secs: u64,
    /// Fraction, e.g. 0.003 = 0.3%
    pub min_level_change_pct: f64,
    pub min_conf_delta: f64,
    pub min_rr_delta: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_conf_for_alert: 60.0,
            min_rr_for_alert: 1.5,
            min_notify_interval_secs: 1800,
            min_level_change_pct: 0.003,
            min_conf_delta: 5.0,
            min_rr_delta: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Universe
    pub instruments: Vec<String>,
    pub scan_interval: u64,

    // Pipeline
    pub group_weights: GroupWeights,
    pub consensus: ConsensusConfig,
    pub ladder: LadderConfig,
    pub plan: PlanConfig,
    pub gate: GateConfig,

    // Collaborators
    pub alert_webhook_url: Option<String>,
    pub snapshot_dir: String,

    // Logging
    pub log_dir: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instruments: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
            scan_interval: 300,
            group_weights: GroupWeights::default(),
            consensus: ConsensusConfig::default(),
            ladder: LadderConfig::default(),
            plan: PlanConfig::default(),
            gate: GateConfig::default(),
            alert_webhook_url: None,
            snapshot_dir: "snapshots".to_string(),
            log_dir: "logs".to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a validated config from any key lookup, falling back to defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let instruments = match get("INSTRUMENTS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => d.instruments,
        };

        let group_weights = match get("GROUP_WEIGHTS") {
            Some(raw) => GroupWeights::parse(&raw)?,
            None => d.group_weights,
        };

        let consensus = ConsensusConfig {
            min_groups_required: parse_or(&get, "MIN_GROUPS_REQUIRED", d.consensus.min_groups_required)?,
            action_min_strength: parse_or(&get, "ACTION_MIN_STRENGTH", d.consensus.action_min_strength)?,
            action_min_confidence: parse_or(&get, "ACTION_MIN_CONFIDENCE", d.consensus.action_min_confidence)?,
            action_max_divergences: parse_or(&get, "ACTION_MAX_DIVERGENCES", d.consensus.action_max_divergences)?,
            unanimity_boost: parse_or(&get, "UNANIMITY_BOOST", d.consensus.unanimity_boost)?,
            divergence_penalty: parse_or(&get, "DIVERGENCE_PENALTY", d.consensus.divergence_penalty)?,
            penalty_min_opposing: parse_or(&get, "PENALTY_MIN_OPPOSING", d.consensus.penalty_min_opposing)?,
        };

        let tp_pcts = match get("LADDER_TP_PCTS") {
            Some(raw) => {
                let parsed = parse_list::<f64>("LADDER_TP_PCTS", &raw)?;
                <[f64; 3]>::try_from(parsed.as_slice()).map_err(|_| {
                    ConfigError::parse("LADDER_TP_PCTS", &raw, "expected exactly three values")
                })?
            }
            None => d.ladder.tp_pcts,
        };
        let ladder = LadderConfig {
            tp_pcts,
            sl_pct: parse_or(&get, "LADDER_SL_PCT", d.ladder.sl_pct)?,
        };

        let timeframes = match get("PLAN_TIMEFRAMES") {
            Some(raw) => parse_list::<Timeframe>("PLAN_TIMEFRAMES", &raw)?,
            None => d.plan.timeframes,
        };
        let plan = PlanConfig {
            min_confidence: parse_or(&get, "PLAN_MIN_CONFIDENCE", d.plan.min_confidence)?,
            max_risk_score: parse_or(&get, "PLAN_MAX_RISK_SCORE", d.plan.max_risk_score)?,
            min_rr: parse_or(&get, "PLAN_MIN_RR", d.plan.min_rr)?,
            risk_low_max: parse_or(&get, "RISK_LOW_MAX", d.plan.risk_low_max)?,
            risk_medium_max: parse_or(&get, "RISK_MEDIUM_MAX", d.plan.risk_medium_max)?,
            level_precedence: parse_or(&get, "LEVEL_PRECEDENCE", d.plan.level_precedence)?,
            timeframes,
        };

        let gate = GateConfig {
            min_conf_for_alert: parse_or(&get, "ALERT_MIN_CONFIDENCE", d.gate.min_conf_for_alert)?,
            min_rr_for_alert: parse_or(&get, "ALERT_MIN_RR", d.gate.min_rr_for_alert)?,
            min_notify_interval_secs: parse_or(&get, "MIN_NOTIFY_INTERVAL", d.gate.min_notify_interval_secs)?,
            min_level_change_pct: parse_or(&get, "MIN_LEVEL_CHANGE_PCT", d.gate.min_level_change_pct)?,
            min_conf_delta: parse_or(&get, "MIN_CONF_DELTA", d.gate.min_conf_delta)?,
            min_rr_delta: parse_or(&get, "MIN_RR_DELTA", d.gate.min_rr_delta)?,
        };

        let cfg = Config {
            instruments,
            scan_interval: parse_or(&get, "SCAN_INTERVAL", d.scan_interval)?,
            group_weights,
            consensus,
            ladder,
            plan,
            gate,
            alert_webhook_url: get("ALERT_WEBHOOK_URL"),
            snapshot_dir: get("SNAPSHOT_DIR").unwrap_or(d.snapshot_dir),
            log_dir: get("LOG_DIR").unwrap_or(d.log_dir),
            log_level: get("LOG_LEVEL").unwrap_or(d.log_level),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::invalid("INSTRUMENTS", "no instruments configured"));
        }
        if self.scan_interval == 0 {
            return Err(ConfigError::invalid("SCAN_INTERVAL", "must be positive"));
        }

        for (name, w) in self.group_weights.all() {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::invalid(
                    "GROUP_WEIGHTS",
                    format!("weight for {} must be a non-negative number, got {}", name, w),
                ));
            }
        }

        let c = &self.consensus;
        if c.min_groups_required == 0 {
            return Err(ConfigError::invalid("MIN_GROUPS_REQUIRED", "must be at least 1"));
        }
        check_range("ACTION_MIN_STRENGTH", c.action_min_strength, 0.0, 100.0)?;
        check_range("ACTION_MIN_CONFIDENCE", c.action_min_confidence, 0.0, 100.0)?;
        check_range("UNANIMITY_BOOST", c.unanimity_boost, 1.0, 10.0)?;
        check_range("DIVERGENCE_PENALTY", c.divergence_penalty, 0.0, 1.0)?;
        if c.penalty_min_opposing == 0 {
            return Err(ConfigError::invalid("PENALTY_MIN_OPPOSING", "must be at least 1"));
        }

        let l = &self.ladder;
        check_range("LADDER_SL_PCT", l.sl_pct, f64::MIN_POSITIVE, 0.99)?;
        for &pct in &l.tp_pcts {
            check_range("LADDER_TP_PCTS", pct, f64::MIN_POSITIVE, 0.99)?;
        }
        if !(l.tp_pcts[0] <= l.tp_pcts[1] && l.tp_pcts[1] <= l.tp_pcts[2]) {
            return Err(ConfigError::invalid("LADDER_TP_PCTS", "targets must be non-decreasing"));
        }

        let p = &self.plan;
        check_range("PLAN_MIN_CONFIDENCE", p.min_confidence, 0.0, 100.0)?;
        check_range("PLAN_MAX_RISK_SCORE", p.max_risk_score, 0.0, 1.0)?;
        check_range("PLAN_MIN_RR", p.min_rr, 0.0, f64::MAX)?;
        check_range("RISK_LOW_MAX", p.risk_low_max, 0.0, 1.0)?;
        check_range("RISK_MEDIUM_MAX", p.risk_medium_max, p.risk_low_max, 1.0)?;

        let g = &self.gate;
        check_range("ALERT_MIN_CONFIDENCE", g.min_conf_for_alert, 0.0, 100.0)?;
        check_range("ALERT_MIN_RR", g.min_rr_for_alert, 0.0, f64::MAX)?;
        if g.min_notify_interval_secs > MAX_NOTIFY_INTERVAL_SECS {
            return Err(ConfigError::invalid(
                "MIN_NOTIFY_INTERVAL",
                format!("{}s exceeds {}s", g.min_notify_interval_secs, MAX_NOTIFY_INTERVAL_SECS),
            ));
        }
        check_range("MIN_LEVEL_CHANGE_PCT", g.min_level_change_pct, 0.0, 1.0)?;
        check_range("MIN_CONF_DELTA", g.min_conf_delta, 0.0, 100.0)?;
        check_range("MIN_RR_DELTA", g.min_rr_delta, 0.0, f64::MAX)?;

        Ok(())
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::parse(key, &raw, e)),
        None => Ok(default),
    }
}

fn parse_list<T>(key: &str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|e| ConfigError::parse(key, s, e)))
        .collect()
}

fn check_range(key: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::invalid(
            key,
            format!("{} is outside [{}, {}]", value, min, max),
        ));
    }
    Ok(())
}
