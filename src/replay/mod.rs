pub mod report;
pub mod runner;

pub use report::ReplayReport;
pub use runner::{ReplayFrame, ReplayRunner};
