//! Planning and execution.
//!
//! This module provides:
//! - `StageScheduler`: requested names to an ordered `ExecutionPlan`
//! - `PipelineRunner`: stage-by-stage execution with bounded unit parallelism
//! - `RunReport`: per-stage outcomes and every resolved output location

mod integration_tests;
mod plan;
mod report;
mod runner;
mod scheduler;
mod units;

pub use plan::ExecutionPlan;
pub use report::{PathAssignment, RunReport, StageReport};
pub use runner::PipelineRunner;
pub use scheduler::StageScheduler;
pub use units::partition;
