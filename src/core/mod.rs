pub mod consensus;
pub mod levels;
pub mod notification_gate;
pub mod reasoning;
pub mod trade_plan;

pub use consensus::{ConsensusEngine, ConsensusError, MetaSignal};
pub use notification_gate::{GateDecision, NotificationGate};
pub use trade_plan::{PlanRejection, TradePlan, TradePlanBuilder};
