//! Run reports.

use crate::core::{ArtifactKey, Night, StageStatus, WorkUnit};
use crate::errors::FailedUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Where one unit of a stage writes its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAssignment {
    /// The stage.
    pub stage: String,
    /// The unit.
    pub unit: WorkUnit,
    /// Key of the product.
    pub key: ArtifactKey,
    /// Whether the product is in the scratch tree.
    pub scratch: bool,
    /// The output file.
    pub path: PathBuf,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage.
    pub stage: String,
    /// Final status.
    pub status: StageStatus,
    /// Number of units the stage was split into.
    pub units: usize,
    /// Units that failed.
    pub failed_units: Vec<FailedUnit>,
    /// Units never dispatched.
    pub not_dispatched: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id.
    pub run_id: Uuid,
    /// The observing night.
    pub night: Night,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-stage outcomes in execution order.
    pub stages: Vec<StageReport>,
    /// Every output location the run resolved, in execution order.
    pub assignments: Vec<PathAssignment>,
    /// Notes from planning.
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Returns the report of a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Returns the status of a stage, if it was in the plan.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    /// Returns the names of stages that actually ran.
    #[must_use]
    pub fn executed(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Ok)
            .map(|s| s.stage.as_str())
            .collect()
    }

    /// Returns the names of stages skipped on resume.
    #[must_use]
    pub fn skipped(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Skip)
            .map(|s| s.stage.as_str())
            .collect()
    }
}
