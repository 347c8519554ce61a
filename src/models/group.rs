use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Direction;

/// One independent analysis source. Unknown names are kept verbatim in `Other`
/// and weighted with the configured fallback weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnalysisGroup {
    Technical,
    Sentiment,
    Ml,
    Onchain,
    Risk,
    Other(String),
}

impl AnalysisGroup {
    pub fn as_str(&self) -> &str {
        match self {
            AnalysisGroup::Technical => "technical",
            AnalysisGroup::Sentiment => "sentiment",
            AnalysisGroup::Ml => "ml",
            AnalysisGroup::Onchain => "onchain",
            AnalysisGroup::Risk => "risk",
            AnalysisGroup::Other(name) => name,
        }
    }
}

impl From<String> for AnalysisGroup {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "technical" => AnalysisGroup::Technical,
            "sentiment" => AnalysisGroup::Sentiment,
            "ml" => AnalysisGroup::Ml,
            "onchain" | "on_chain" => AnalysisGroup::Onchain,
            "risk" => AnalysisGroup::Risk,
            _ => AnalysisGroup::Other(s),
        }
    }
}

impl From<&str> for AnalysisGroup {
    fn from(s: &str) -> Self {
        AnalysisGroup::from(s.to_string())
    }
}

impl From<AnalysisGroup> for String {
    fn from(g: AnalysisGroup) -> Self {
        match g {
            AnalysisGroup::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AnalysisGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry, stop and up to three targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    #[serde(default)]
    pub tp2: Option<f64>,
    #[serde(default)]
    pub tp3: Option<f64>,
}

/// One group's opinion for one instrument at one instant.
///
/// `direction` and `confidence` are optional on the wire; a signal missing
/// either is not counted by the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSignal {
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub strength: f64,
    #[serde(default)]
    pub levels: Option<PriceLevels>,
}

impl GroupSignal {
    pub fn new(direction: Direction, confidence: f64, strength: f64) -> Self {
        Self {
            direction: Some(direction),
            confidence: Some(confidence),
            strength,
            levels: None,
        }
    }

    /// Direction and clamped confidence, if the signal is usable.
    pub fn vote(&self) -> Option<(Direction, f64)> {
        let direction = self.direction?;
        let confidence = self.confidence?;
        if !confidence.is_finite() {
            return None;
        }
        Some((direction, confidence.clamp(0.0, 100.0)))
    }
}

/// Externally computed risk score for an instrument, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RiskAssessment {
    pub risk_score: f64,
    #[serde(default)]
    pub factors: Vec<String>,
}

/// Everything the pipeline consumes for one instrument in one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    pub symbol: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    pub signals: Vec<(AnalysisGroup, GroupSignal)>,
    #[serde(default)]
    pub levels: Option<PriceLevels>,
    #[serde(default)]
    pub risk: RiskAssessment,
}
