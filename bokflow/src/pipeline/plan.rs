//! Ordered stage lists.

use crate::errors::{BokflowError, DuplicateStageError, StageOrderViolation};
use crate::registry::StageRegistry;
use serde::{Deserialize, Serialize};

/// A dependency-respecting sequence of stages to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    stages: Vec<String>,
    warnings: Vec<String>,
}

impl ExecutionPlan {
    /// Creates a plan from an explicit stage order.
    ///
    /// The order is not checked here; see [`Self::validate`].
    #[must_use]
    pub fn from_stages(stages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Returns non-fatal notes produced while planning.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the plan has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the position of a stage in the plan.
    #[must_use]
    pub fn position(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == stage)
    }

    /// Returns true if the plan contains a stage.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.position(stage).is_some()
    }

    /// Checks that every stage appears once and comes after all of its
    /// direct predecessors, and after any soft predecessor that is also
    /// planned.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` for a stage the registry does not define,
    /// `DuplicateStageError` for a repeated stage, and `StageOrderViolation`
    /// for the first misplaced stage.
    pub fn validate(&self, registry: &StageRegistry) -> Result<(), BokflowError> {
        for (i, name) in self.stages.iter().enumerate() {
            let def = registry.stage(name)?;
            let earlier = &self.stages[..i];
            if earlier.contains(name) {
                return Err(DuplicateStageError {
                    stage: name.clone(),
                }
                .into());
            }

            for pred in &def.predecessors {
                if !earlier.contains(pred) {
                    return Err(StageOrderViolation {
                        stage: name.clone(),
                        predecessor: pred.clone(),
                    }
                    .into());
                }
            }
            for pred in &def.soft_predecessors {
                if self.contains(pred) && !earlier.contains(pred) {
                    return Err(StageOrderViolation {
                        stage: name.clone(),
                        predecessor: pred.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stages.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{STAGE_BIAS2D, STAGE_OSCAN, STAGE_PROC1};

    #[test]
    fn test_out_of_order_plan_rejected() {
        let registry = StageRegistry::standard();
        let plan = ExecutionPlan::from_stages([STAGE_BIAS2D, STAGE_OSCAN]);
        let err = plan.validate(&registry).unwrap_err();
        match err {
            BokflowError::StageOrder(v) => {
                assert_eq!(v.stage, STAGE_BIAS2D);
                assert_eq!(v.predecessor, STAGE_OSCAN);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_predecessor_rejected() {
        let registry = StageRegistry::standard();
        let plan = ExecutionPlan::from_stages([STAGE_PROC1]);
        assert!(matches!(
            plan.validate(&registry),
            Err(BokflowError::StageOrder(_))
        ));
    }

    #[test]
    fn test_soft_predecessor_order_checked_when_planned() {
        let registry = StageRegistry::standard();
        let ok = ExecutionPlan::from_stages(["oscan", "bias2d", "flat2d", "proc1"]);
        ok.validate(&registry).unwrap();

        let late_mask = ExecutionPlan::from_stages(["oscan", "bias2d", "flat2d", "proc1", "badpix"]);
        assert!(late_mask.validate(&registry).is_err());
    }

    #[test]
    fn test_repeated_stage_rejected() {
        let registry = StageRegistry::standard();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN, STAGE_BIAS2D, STAGE_OSCAN]);
        match plan.validate(&registry).unwrap_err() {
            BokflowError::DuplicateStage(e) => assert_eq!(e.stage, STAGE_OSCAN),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let registry = StageRegistry::standard();
        let plan = ExecutionPlan::from_stages(["mosaic"]);
        assert!(matches!(
            plan.validate(&registry),
            Err(BokflowError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_display() {
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN, STAGE_BIAS2D]);
        assert_eq!(plan.to_string(), "oscan -> bias2d");
        assert_eq!(plan.position(STAGE_BIAS2D), Some(1));
    }
}
