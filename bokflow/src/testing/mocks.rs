//! Mock processors.

use crate::processor::{FrameProcessor, ProcessorError, UnitRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// One recorded processor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorCall {
    /// The stage.
    pub stage: String,
    /// The unit id.
    pub unit: String,
    /// The unit's output file.
    pub output: PathBuf,
}

/// A processor that records every call and fails the units it is told to.
///
/// By default every unit succeeds without touching the filesystem.
#[derive(Debug, Default)]
pub struct ScriptedProcessor {
    failing_stages: HashSet<String>,
    failing_units: HashSet<(String, String)>,
    delay: Option<Duration>,
    write_outputs: bool,
    calls: Mutex<Vec<ProcessorCall>>,
}

impl ScriptedProcessor {
    /// Creates a processor where every unit succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every unit of a stage.
    #[must_use]
    pub fn failing_stage(mut self, stage: impl Into<String>) -> Self {
        self.failing_stages.insert(stage.into());
        self
    }

    /// Fails one unit of a stage.
    #[must_use]
    pub fn failing_unit(mut self, stage: impl Into<String>, unit: impl Into<String>) -> Self {
        self.failing_units.insert((stage.into(), unit.into()));
        self
    }

    /// Sleeps before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Writes an empty output file for each successful unit.
    #[must_use]
    pub fn writing_outputs(mut self) -> Self {
        self.write_outputs = true;
        self
    }

    /// Returns every call, in the order they started.
    #[must_use]
    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.calls.lock().clone()
    }

    /// Returns the distinct stages that were called, in first-call order.
    #[must_use]
    pub fn stages_called(&self) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for call in self.calls.lock().iter() {
            if !stages.contains(&call.stage) {
                stages.push(call.stage.clone());
            }
        }
        stages
    }

    /// Returns the units called for a stage.
    #[must_use]
    pub fn units_called(&self, stage: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.unit.clone())
            .collect()
    }

    fn should_fail(&self, request: &UnitRequest) -> bool {
        self.failing_stages.contains(&request.stage)
            || self
                .failing_units
                .contains(&(request.stage.clone(), request.unit.to_string()))
    }
}

#[async_trait]
impl FrameProcessor for ScriptedProcessor {
    async fn apply(&self, request: &UnitRequest) -> Result<(), ProcessorError> {
        self.calls.lock().push(ProcessorCall {
            stage: request.stage.clone(),
            unit: request.unit.to_string(),
            output: request.output.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(request) {
            return Err(ProcessorError::Failed(format!(
                "scripted failure of {} on {}",
                request.unit, request.stage
            )));
        }

        if self.write_outputs {
            if let Some(parent) = request.output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&request.output, b"").await?;
        }
        Ok(())
    }
}
