pub mod convergence;
pub mod statistics;
pub mod tracker;

pub use convergence::{ConvergenceReport, ConvergenceTracker, CONVERGENCE_WINDOW};
pub use statistics::{RunningStats, Statistics};
pub use tracker::{ActionRecord, AgentStatistics, StrategySummary};
