pub mod direction;
pub mod group;
pub mod timeframe;

pub use direction::*;
pub use group::{AnalysisGroup, GroupSignal, InstrumentSnapshot, PriceLevels, RiskAssessment};
pub use timeframe::Timeframe;
