//! Splits a stage into units of work.

use crate::core::{validate_segment, Night, WorkUnit};
use crate::errors::ArtifactKeyError;
use crate::processor::ObservationLog;
use crate::registry::{Granularity, StageDef};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Returns the units a stage processes for a night.
///
/// Frame units follow band order, then observation log order. Exposure ids
/// name output files, so they must be plain path segments; an id listed
/// twice in a band yields one unit.
///
/// # Errors
///
/// Returns an error for an exposure id that is not a valid path segment.
pub fn partition(
    stage: &StageDef,
    night: &Night,
    bands: &[String],
    ccds: &BTreeSet<u8>,
    obslog: &dyn ObservationLog,
) -> Result<Vec<WorkUnit>, ArtifactKeyError> {
    match stage.granularity {
        Granularity::Ccd => Ok(ccds.iter().map(|&ccd| WorkUnit::ccd(ccd)).collect()),
        Granularity::Band => Ok(bands.iter().map(WorkUnit::band_unit).collect()),
        Granularity::Frame => {
            let mut units = Vec::new();
            for band in bands {
                let mut seen = HashSet::new();
                for frame in obslog.frames(night, band) {
                    validate_segment("frame", &frame)?;
                    if !seen.insert(frame.clone()) {
                        warn!(night = %night, band = %band, frame = %frame, "Duplicate exposure in observation log");
                        continue;
                    }
                    units.push(WorkUnit::frame(band.as_str(), frame));
                }
            }
            Ok(units)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::StaticObservationLog;
    use crate::registry::{Granularity, StageDef};

    fn night() -> Night {
        Night::parse("20210615").unwrap()
    }

    fn log() -> StaticObservationLog {
        StaticObservationLog::new()
            .with_frames(&night(), "g", ["d1", "d2"])
            .with_frames(&night(), "r", ["d3"])
    }

    #[test]
    fn test_partition_by_granularity() {
        let bands = vec!["g".to_string(), "r".to_string()];
        let ccds: BTreeSet<u8> = [1, 2, 3, 4].into();

        let frames = partition(&StageDef::new("proc1", "proc1"), &night(), &bands, &ccds, &log())
            .unwrap();
        assert_eq!(
            frames,
            vec![
                WorkUnit::frame("g", "d1"),
                WorkUnit::frame("g", "d2"),
                WorkUnit::frame("r", "d3"),
            ]
        );

        let per_ccd = StageDef::new("bias2d", "bias").per(Granularity::Ccd);
        assert_eq!(partition(&per_ccd, &night(), &bands, &ccds, &log()).unwrap().len(), 4);

        let per_band = StageDef::new("fringe", "fringe").per(Granularity::Band);
        assert_eq!(
            partition(&per_band, &night(), &bands, &ccds, &log()).unwrap(),
            vec![WorkUnit::band_unit("g"), WorkUnit::band_unit("r")]
        );
    }

    #[test]
    fn test_repeated_exposure_yields_one_unit() {
        let log = StaticObservationLog::new()
            .with_frames(&night(), "g", ["d2", "d1", "d2"])
            .with_frames(&night(), "r", ["d2"]);
        let units = partition(
            &StageDef::new("oscan", "oscan"),
            &night(),
            &["g".to_string(), "r".to_string()],
            &BTreeSet::new(),
            &log,
        )
        .unwrap();
        assert_eq!(
            units,
            vec![
                WorkUnit::frame("g", "d2"),
                WorkUnit::frame("g", "d1"),
                WorkUnit::frame("r", "d2"),
            ]
        );
    }

    #[test]
    fn test_unsafe_frame_id_rejected() {
        let log = StaticObservationLog::new().with_frames(&night(), "g", ["../d1"]);
        let err = partition(
            &StageDef::new("proc1", "proc1"),
            &night(),
            &["g".to_string()],
            &BTreeSet::new(),
            &log,
        )
        .unwrap_err();
        assert_eq!(err.field, "frame");
    }
}
