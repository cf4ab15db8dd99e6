//! Executes a plan stage by stage.

use super::report::{PathAssignment, RunReport, StageReport};
use super::units::partition;
use super::ExecutionPlan;
use crate::artifacts::{stage_params_hash, ArtifactTracker, CompletionMarker};
use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::core::{StageStatus, UnitStatus, WorkUnit};
use crate::errors::{BokflowError, FailedUnit, ObservationLogError, UnitFailure};
use crate::events::{
    EventSink, NoOpEventSink, RUN_COMPLETED, RUN_FAILED, RUN_STARTED, SCRATCH_CLEANED,
    STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED, STAGE_STARTED, UNIT_FAILED,
};
use crate::processor::{FrameProcessor, ObservationLog, UnitRequest};
use crate::registry::{StageDef, StageRegistry};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs execution plans.
///
/// Stages run strictly one after another. Within a stage, units run
/// concurrently up to the configured parallelism and the stage ends only
/// when every dispatched unit has finished.
#[derive(Clone)]
pub struct PipelineRunner {
    registry: Arc<StageRegistry>,
    processor: Arc<dyn FrameProcessor>,
    obslog: Arc<dyn ObservationLog>,
    sink: Arc<dyn EventSink>,
}

/// The resolved work of one stage.
struct StageWork {
    requests: Vec<UnitRequest>,
    assignments: Vec<PathAssignment>,
}

impl PipelineRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        registry: Arc<StageRegistry>,
        processor: Arc<dyn FrameProcessor>,
        obslog: Arc<dyn ObservationLog>,
    ) -> Self {
        Self {
            registry,
            processor,
            obslog,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Bands to process: every band observed, narrowed by the configured
    /// filter. Filtered bands with no exposures are dropped.
    fn bands(&self, config: &RunConfig) -> Result<Vec<String>, ObservationLogError> {
        let observed = self.obslog.bands(config.night());
        let bands: Vec<String> = if config.bands().is_empty() {
            observed
        } else {
            config
                .bands()
                .iter()
                .filter(|band| {
                    let seen = observed.contains(*band);
                    if !seen {
                        warn!(
                            night = %config.night(),
                            band = %band,
                            "No exposures in requested band; skipping it"
                        );
                    }
                    seen
                })
                .cloned()
                .collect()
        };
        if bands.is_empty() {
            return Err(ObservationLogError::NoObservations {
                night: config.night().to_string(),
                bands: config.bands().iter().cloned().collect(),
            });
        }
        Ok(bands)
    }

    /// Emits an event tagged with the run id.
    async fn emit(&self, event_type: &str, run_id: Uuid, mut data: serde_json::Value) {
        if let Some(fields) = data.as_object_mut() {
            fields.insert("run_id".to_string(), serde_json::json!(run_id));
        }
        self.sink.emit(event_type, Some(data)).await;
    }

    fn stage_work(
        &self,
        tracker: &ArtifactTracker,
        stage: &StageDef,
        config: &RunConfig,
        bands: &[String],
    ) -> Result<StageWork, BokflowError> {
        let units = partition(
            stage,
            config.night(),
            bands,
            config.ccds(),
            self.obslog.as_ref(),
        )?;
        let mut requests = Vec::with_capacity(units.len());
        let mut assignments = Vec::with_capacity(units.len());

        for unit in units {
            let io = tracker.stage_io(&self.registry, stage, config.night(), &unit, bands)?;
            assignments.push(PathAssignment {
                stage: stage.name.clone(),
                unit: unit.clone(),
                key: io.output_key.clone(),
                scratch: io.scratch,
                path: io.output.clone(),
            });
            requests.push(UnitRequest {
                stage: stage.name.clone(),
                frame_type: stage.produces.clone(),
                night: config.night().clone(),
                unit,
                raw_data_root: config.raw_data_root().to_path_buf(),
                inputs: io.inputs,
                output: io.output,
                stage_flags: stage.flags.clone(),
                processing_flags: config.flags(),
                wcs_config: config.wcs_config().to_vec(),
            });
        }
        Ok(StageWork {
            requests,
            assignments,
        })
    }

    /// Resolves every output location a plan would write, without running
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is out of order or a location cannot be
    /// resolved.
    pub fn assignments(
        &self,
        plan: &ExecutionPlan,
        config: &RunConfig,
    ) -> Result<Vec<PathAssignment>, BokflowError> {
        plan.validate(&self.registry)?;
        let tracker = ArtifactTracker::new(config.output_root());
        let bands = self.bands(config)?;
        let mut assignments = Vec::new();
        for name in plan.stages() {
            let stage = self.registry.stage(name)?;
            assignments.extend(self.stage_work(&tracker, stage, config, &bands)?.assignments);
        }
        Ok(assignments)
    }

    /// Executes a plan.
    ///
    /// # Errors
    ///
    /// Returns `StageOrderViolation` or `DuplicateStageError` before anything
    /// runs if the plan is malformed, `ObservationLogError` if nothing was
    /// observed in the requested bands, and `UnitFailure` for the first stage
    /// with a failed unit; later stages are not started. A stage's completion
    /// marker is removed before its units are dispatched, so a failed rerun
    /// is never resumed past.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        config: &RunConfig,
    ) -> Result<RunReport, BokflowError> {
        plan.validate(&self.registry)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tracker = ArtifactTracker::new(config.output_root());
        let fingerprint = config.fingerprint();
        let bands = self.bands(config)?;

        info!(
            run_id = %run_id,
            night = %config.night(),
            stages = plan.len(),
            parallelism = config.parallelism().get(),
            "Starting run"
        );
        self.emit(
            RUN_STARTED,
            run_id,
            serde_json::json!({
                "night": config.night(),
                "stages": plan.stages(),
                "bands": &bands,
            }),
        )
        .await;

        let mut stages = Vec::with_capacity(plan.len());
        let mut assignments = Vec::new();

        for name in plan.stages() {
            let stage = self.registry.stage(name)?;
            let work = self.stage_work(&tracker, stage, config, &bands)?;
            assignments.extend(work.assignments);

            let params_hash = stage_params_hash(&fingerprint, stage);
            if config.resume()
                && tracker
                    .is_complete(config.night(), &stage.name, &params_hash)
                    .await
            {
                info!(stage = %stage.name, "Stage already complete; skipping");
                self.emit(
                    STAGE_SKIPPED,
                    run_id,
                    serde_json::json!({
                        "stage": &stage.name,
                        "reason": "completion marker matches",
                    }),
                )
                .await;
                stages.push(StageReport {
                    stage: stage.name.clone(),
                    status: StageStatus::Skip,
                    units: work.requests.len(),
                    failed_units: Vec::new(),
                    not_dispatched: Vec::new(),
                    duration_ms: 0,
                });
                continue;
            }

            tracker.remove_marker(config.night(), &stage.name).await?;
            match self.run_stage(run_id, stage, work.requests, config).await {
                Ok(report) => {
                    let marker = CompletionMarker::new(stage.name.as_str(), params_hash, run_id);
                    tracker.write_marker(config.night(), &marker).await?;
                    stages.push(report);
                }
                Err(failure) => {
                    self.emit(
                        RUN_FAILED,
                        run_id,
                        serde_json::json!({
                            "stage": &failure.stage,
                            "completed": stages.len(),
                        }),
                    )
                    .await;
                    return Err(failure.into());
                }
            }

            if self.registry.completes_derivation(&stage.name)
                && tracker.cleanup_scratch(config.night()).await?
            {
                self.emit(
                    SCRATCH_CLEANED,
                    run_id,
                    serde_json::json!({
                        "night": config.night(),
                    }),
                )
                .await;
            }
        }

        let report = RunReport {
            run_id,
            night: config.night().clone(),
            started_at,
            finished_at: Utc::now(),
            stages,
            assignments,
            warnings: plan.warnings().to_vec(),
        };
        info!(
            run_id = %run_id,
            executed = report.executed().len(),
            skipped = report.skipped().len(),
            "Run complete"
        );
        self.emit(
            RUN_COMPLETED,
            run_id,
            serde_json::json!({
                "executed": report.executed(),
                "skipped": report.skipped(),
            }),
        )
        .await;
        Ok(report)
    }

    /// Runs every unit of one stage with bounded concurrency.
    ///
    /// The first failure cancels the stage: units not yet started are not
    /// dispatched, units already running finish.
    async fn run_stage(
        &self,
        run_id: Uuid,
        stage: &StageDef,
        requests: Vec<UnitRequest>,
        config: &RunConfig,
    ) -> Result<StageReport, UnitFailure> {
        let unit_count = requests.len();
        if unit_count == 0 {
            warn!(stage = %stage.name, "Stage has no units for this night");
        }
        self.emit(
            STAGE_STARTED,
            run_id,
            serde_json::json!({
                "stage": &stage.name,
                "units": unit_count,
            }),
        )
        .await;

        let token = Arc::new(CancellationToken::new());
        let stage_start = Instant::now();

        let mut results: Vec<(usize, WorkUnit, UnitStatus, Option<String>)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(i, request)| {
                    let processor = Arc::clone(&self.processor);
                    let token = Arc::clone(&token);
                    async move {
                        if token.is_cancelled() {
                            return (i, request.unit, UnitStatus::NotDispatched, None);
                        }
                        match processor.apply(&request).await {
                            Ok(()) => (i, request.unit, UnitStatus::Ok, None),
                            Err(e) => {
                                token.cancel(format!("unit {} failed", request.unit));
                                (i, request.unit, UnitStatus::Fail, Some(e.to_string()))
                            }
                        }
                    }
                })
                .buffer_unordered(config.parallelism().get())
                .collect()
                .await;
        results.sort_by_key(|(i, ..)| *i);

        let duration_ms = u64::try_from(stage_start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut failed_units = Vec::new();
        let mut not_dispatched = Vec::new();
        for (_, unit, status, message) in results {
            match status {
                UnitStatus::Ok => {}
                UnitStatus::Fail => {
                    let message = message.unwrap_or_default();
                    error!(stage = %stage.name, unit = %unit, error = %message, "Unit failed");
                    self.emit(
                        UNIT_FAILED,
                        run_id,
                        serde_json::json!({
                            "stage": &stage.name,
                            "unit": unit.to_string(),
                            "error": &message,
                        }),
                    )
                    .await;
                    failed_units.push(FailedUnit {
                        unit: unit.to_string(),
                        error: message,
                    });
                }
                UnitStatus::NotDispatched => not_dispatched.push(unit.to_string()),
            }
        }

        if failed_units.is_empty() {
            info!(stage = %stage.name, units = unit_count, duration_ms, "Stage completed");
            self.emit(
                STAGE_COMPLETED,
                run_id,
                serde_json::json!({
                    "stage": &stage.name,
                    "units": unit_count,
                    "duration_ms": duration_ms,
                }),
            )
            .await;
            Ok(StageReport {
                stage: stage.name.clone(),
                status: StageStatus::Ok,
                units: unit_count,
                failed_units,
                not_dispatched,
                duration_ms,
            })
        } else {
            error!(
                stage = %stage.name,
                failed = failed_units.len(),
                not_dispatched = not_dispatched.len(),
                "Stage failed"
            );
            self.emit(
                STAGE_FAILED,
                run_id,
                serde_json::json!({
                    "stage": &stage.name,
                    "failed_units": &failed_units,
                    "not_dispatched": &not_dispatched,
                    "duration_ms": duration_ms,
                }),
            )
            .await;
            Err(UnitFailure {
                stage: stage.name.clone(),
                failed_units,
                not_dispatched,
            })
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.registry.len())
            .finish_non_exhaustive()
    }
}
