//! End-to-end runs against the standard catalog.

#[cfg(test)]
mod tests {
    use crate::artifacts::ArtifactTracker;
    use crate::config::Epoch;
    use crate::core::{Night, StageStatus};
    use crate::errors::BokflowError;
    use crate::events::{CollectingEventSink, RUN_COMPLETED, RUN_STARTED, SCRATCH_CLEANED};
    use crate::pipeline::{ExecutionPlan, PipelineRunner, StageScheduler};
    use crate::processor::{FrameProcessor, ProcessorError, StaticObservationLog, UnitRequest};
    use crate::registry::{
        StageRegistry, GROUP_ALL, STAGE_BIAS2D, STAGE_FLAT2D, STAGE_FRINGE, STAGE_OSCAN,
        STAGE_PROC1, STAGE_PROC2, STAGE_SKYFLAT, STAGE_SKYFLAT_FRINGE, STAGE_SKYFLAT_ILLUM,
    };
    use crate::testing::{observation_log, ScriptedProcessor, TestConfig};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn night() -> Night {
        Night::parse("20210615").unwrap()
    }

    fn runner(processor: Arc<dyn FrameProcessor>) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(StageRegistry::standard()),
            processor,
            Arc::new(observation_log(&night(), &["g", "r"], 3)),
        )
    }

    fn full_plan() -> ExecutionPlan {
        StageScheduler::new(&StageRegistry::standard())
            .plan(&[GROUP_ALL])
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_night_runs_every_stage_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new().writing_outputs());
        let sink = Arc::new(CollectingEventSink::new());
        let runner = runner(processor.clone()).with_event_sink(sink.clone());
        let config = TestConfig::new(night(), dir.path()).with_parallelism(4).build();
        let plan = full_plan();

        let report = runner.execute(&plan, &config).await.unwrap();

        assert_eq!(processor.stages_called(), plan.stages().to_vec());
        assert_eq!(report.executed().len(), plan.len());
        assert_eq!(report.stage(STAGE_PROC1).unwrap().units, 6);
        assert_eq!(report.stage(STAGE_BIAS2D).unwrap().units, 4);
        assert_eq!(report.stage(STAGE_FRINGE).unwrap().units, 2);

        let tracker = ArtifactTracker::new(dir.path());
        assert!(!tracker.scratch_root(&night()).exists());
        assert!(dir
            .path()
            .join("rdx/20210615/g/skyflat/final/g.fits")
            .is_file());
        for stage in plan.stages() {
            assert!(tracker.marker_path(&night(), stage).is_file(), "{stage}");
        }

        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some(RUN_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(RUN_COMPLETED));
        assert_eq!(types.iter().filter(|t| *t == SCRATCH_CLEANED).count(), 1);
        let run_id = serde_json::json!(report.run_id);
        for (event_type, data) in sink.events() {
            let data = data.unwrap_or_default();
            assert_eq!(data.get("run_id"), Some(&run_id), "{event_type}");
        }
    }

    #[tokio::test]
    async fn test_fringe_failure_stops_the_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(
            ScriptedProcessor::new()
                .writing_outputs()
                .failing_unit(STAGE_FRINGE, "r"),
        );
        let config = TestConfig::new(night(), dir.path()).with_parallelism(2).build();

        let err = runner(processor.clone())
            .execute(&full_plan(), &config)
            .await
            .unwrap_err();

        let BokflowError::UnitFailure(failure) = err else {
            panic!("expected a unit failure");
        };
        assert_eq!(failure.stage, STAGE_FRINGE);
        assert_eq!(failure.failed_units.len(), 1);
        assert_eq!(failure.failed_units[0].unit, "r");

        let called = processor.stages_called();
        assert!(called.contains(&STAGE_SKYFLAT_ILLUM.to_string()));
        for later in [STAGE_SKYFLAT_FRINGE, STAGE_SKYFLAT, STAGE_PROC2] {
            assert!(!called.contains(&later.to_string()), "{later} must not run");
        }

        let tracker = ArtifactTracker::new(dir.path());
        assert!(tracker.scratch_root(&night()).exists());
        assert!(!tracker.marker_path(&night(), STAGE_FRINGE).exists());
        assert!(tracker.marker_path(&night(), STAGE_SKYFLAT_ILLUM).exists());
    }

    #[tokio::test]
    async fn test_units_after_a_failure_are_not_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(
            ScriptedProcessor::new().failing_unit(STAGE_OSCAN, "g/d20210615.g.0001"),
        );
        let config = TestConfig::new(night(), dir.path()).build();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN]);

        let err = runner(processor.clone())
            .execute(&plan, &config)
            .await
            .unwrap_err();

        let BokflowError::UnitFailure(failure) = err else {
            panic!("expected a unit failure");
        };
        assert_eq!(failure.failed_units.len(), 1);
        assert_eq!(failure.not_dispatched.len(), 5);
        assert_eq!(processor.units_called(STAGE_OSCAN).len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_units_drain_after_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(
            ScriptedProcessor::new()
                .failing_stage(STAGE_OSCAN)
                .with_delay(Duration::from_millis(5)),
        );
        let config = TestConfig::new(night(), dir.path()).with_parallelism(2).build();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN, STAGE_BIAS2D]);

        let err = runner(processor.clone())
            .execute(&plan, &config)
            .await
            .unwrap_err();

        let BokflowError::UnitFailure(failure) = err else {
            panic!("expected a unit failure");
        };
        assert_eq!(failure.stage, STAGE_OSCAN);
        assert_eq!(failure.failed_units.len(), 2);
        assert_eq!(failure.not_dispatched.len(), 4);
        assert!(processor.units_called(STAGE_BIAS2D).is_empty());
    }

    #[derive(Debug, Default)]
    struct ConcurrencyProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FrameProcessor for ConcurrencyProbe {
        async fn apply(&self, _request: &UnitRequest) -> Result<(), ProcessorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_parallelism_bounds_in_flight_units() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Arc::new(ConcurrencyProbe::default());
        let config = TestConfig::new(night(), dir.path()).with_parallelism(2).build();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN]);

        runner(probe.clone()).execute(&plan, &config).await.unwrap();

        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {peak}");
        assert_eq!(probe.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_path_assignments_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = TestConfig::new(night(), dir.path()).build();
        let plan = full_plan();

        let first = runner(Arc::new(ScriptedProcessor::new()))
            .execute(&plan, &config)
            .await
            .unwrap();
        let second = runner(Arc::new(ScriptedProcessor::new()))
            .execute(&plan, &config)
            .await
            .unwrap();

        assert_eq!(first.assignments, second.assignments);
        assert_eq!(
            runner(Arc::new(ScriptedProcessor::new()))
                .assignments(&plan, &config)
                .unwrap(),
            first.assignments
        );
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_resume_skips_matching_markers_only() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StageScheduler::new(&StageRegistry::standard())
            .plan(&[STAGE_PROC1])
            .unwrap();
        let config = TestConfig::new(night(), dir.path()).build();
        runner(Arc::new(ScriptedProcessor::new()))
            .execute(&plan, &config)
            .await
            .unwrap();

        let processor = Arc::new(ScriptedProcessor::new());
        let resumed = TestConfig::new(night(), dir.path()).resuming().build();
        let report = runner(processor.clone())
            .execute(&plan, &resumed)
            .await
            .unwrap();
        assert!(processor.calls().is_empty());
        assert_eq!(report.skipped().len(), plan.len());
        assert_eq!(report.status(STAGE_PROC1), Some(StageStatus::Skip));

        let processor = Arc::new(ScriptedProcessor::new());
        let changed = TestConfig::new(night(), dir.path())
            .with_epoch(Epoch::Legacy)
            .resuming()
            .build();
        let report = runner(processor.clone())
            .execute(&plan, &changed)
            .await
            .unwrap();
        assert_eq!(processor.stages_called(), plan.stages().to_vec());
        assert!(report.skipped().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rerun_is_not_resumed_past() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StageScheduler::new(&StageRegistry::standard())
            .plan(&[STAGE_PROC1])
            .unwrap();
        let config = TestConfig::new(night(), dir.path()).build();
        runner(Arc::new(ScriptedProcessor::new()))
            .execute(&plan, &config)
            .await
            .unwrap();

        let failing = Arc::new(ScriptedProcessor::new().failing_stage(STAGE_PROC1));
        runner(failing).execute(&plan, &config).await.unwrap_err();
        let tracker = ArtifactTracker::new(dir.path());
        assert!(!tracker.marker_path(&night(), STAGE_PROC1).exists());
        assert!(tracker.marker_path(&night(), STAGE_OSCAN).exists());

        let processor = Arc::new(ScriptedProcessor::new());
        let resumed = TestConfig::new(night(), dir.path()).resuming().build();
        let report = runner(processor.clone())
            .execute(&plan, &resumed)
            .await
            .unwrap();
        assert_eq!(report.status(STAGE_PROC1), Some(StageStatus::Ok));
        assert_eq!(report.status(STAGE_OSCAN), Some(StageStatus::Skip));
        assert_eq!(processor.stages_called(), vec![STAGE_PROC1.to_string()]);
        assert_eq!(processor.units_called(STAGE_PROC1).len(), 6);
    }

    #[tokio::test]
    async fn test_repeated_exposures_get_one_output_each() {
        let dir = tempfile::tempdir().unwrap();
        let log = StaticObservationLog::new().with_frames(&night(), "g", ["d1", "d2", "d1"]);
        let runner = PipelineRunner::new(
            Arc::new(StageRegistry::standard()),
            Arc::new(ScriptedProcessor::new()),
            Arc::new(log),
        );
        let config = TestConfig::new(night(), dir.path()).build();

        let assignments = runner
            .assignments(&ExecutionPlan::from_stages([STAGE_OSCAN]), &config)
            .unwrap();
        let paths: BTreeSet<_> = assignments.iter().map(|a| a.path.clone()).collect();
        assert_eq!(assignments.len(), 2);
        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn test_unobserved_bands_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new());
        let config = TestConfig::new(night(), dir.path())
            .with_band("g")
            .with_band("z")
            .build();
        let plan = StageScheduler::new(&StageRegistry::standard())
            .plan(&[STAGE_FLAT2D])
            .unwrap();

        runner(processor.clone()).execute(&plan, &config).await.unwrap();
        assert_eq!(processor.units_called(STAGE_FLAT2D), vec!["g".to_string()]);

        let only_z = TestConfig::new(night(), dir.path()).with_band("z").build();
        let err = runner(processor.clone())
            .execute(&plan, &only_z)
            .await
            .unwrap_err();
        assert!(matches!(err, BokflowError::ObservationLog(_)));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_night_without_exposures_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new());
        let runner = PipelineRunner::new(
            Arc::new(StageRegistry::standard()),
            processor.clone(),
            Arc::new(StaticObservationLog::new()),
        );
        let config = TestConfig::new(night(), dir.path()).build();

        let err = runner.execute(&full_plan(), &config).await.unwrap_err();
        assert!(matches!(err, BokflowError::ObservationLog(_)));
        assert!(processor.calls().is_empty());
        assert!(!ArtifactTracker::new(dir.path())
            .marker_path(&night(), STAGE_OSCAN)
            .exists());
    }

    #[tokio::test]
    async fn test_out_of_order_plan_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new());
        let config = TestConfig::new(night(), dir.path()).build();
        let plan = ExecutionPlan::from_stages([STAGE_BIAS2D, STAGE_OSCAN]);

        let err = runner(processor.clone())
            .execute(&plan, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, BokflowError::StageOrder(_)));
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_band_filter_limits_units() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new());
        let config = TestConfig::new(night(), dir.path()).with_band("g").build();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN]);

        runner(processor.clone()).execute(&plan, &config).await.unwrap();
        let units = processor.units_called(STAGE_OSCAN);
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.starts_with("g/")));
    }

    #[tokio::test]
    async fn test_ccd_subset_limits_ccd_units() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(ScriptedProcessor::new());
        let config = TestConfig::new(night(), dir.path())
            .with_ccds([3, 1])
            .build();
        let plan = ExecutionPlan::from_stages([STAGE_OSCAN, STAGE_BIAS2D]);

        runner(processor.clone()).execute(&plan, &config).await.unwrap();
        assert_eq!(
            processor.units_called(STAGE_BIAS2D),
            vec!["ccd1".to_string(), "ccd3".to_string()]
        );
    }
}
