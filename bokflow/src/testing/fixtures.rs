//! Run fixtures.

use crate::config::{Epoch, ProcessingFlags, RunConfig};
use crate::core::Night;
use crate::processor::StaticObservationLog;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Builds a [`RunConfig`] directly, without the environment or file checks.
#[derive(Debug, Clone)]
pub struct TestConfig {
    night: Night,
    output_root: PathBuf,
    bands: BTreeSet<String>,
    ccds: BTreeSet<u8>,
    parallelism: NonZeroUsize,
    epoch: Epoch,
    resume: bool,
}

impl TestConfig {
    /// Creates a config for a night writing under `output_root`.
    #[must_use]
    pub fn new(night: Night, output_root: impl Into<PathBuf>) -> Self {
        Self {
            night,
            output_root: output_root.into(),
            bands: BTreeSet::new(),
            ccds: (1..=4).collect(),
            parallelism: NonZeroUsize::MIN,
            epoch: Epoch::Current,
            resume: false,
        }
    }

    /// Restricts the run to a band.
    #[must_use]
    pub fn with_band(mut self, band: impl Into<String>) -> Self {
        self.bands.insert(band.into());
        self
    }

    /// Sets the CCD subset.
    #[must_use]
    pub fn with_ccds(mut self, ccds: impl IntoIterator<Item = u8>) -> Self {
        self.ccds = ccds.into_iter().collect();
        self
    }

    /// Sets the parallelism; zero is raised to one.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = NonZeroUsize::new(parallelism).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Sets the camera epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = epoch;
        self
    }

    /// Enables resumption.
    #[must_use]
    pub fn resuming(mut self) -> Self {
        self.resume = true;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RunConfig {
        RunConfig {
            night: self.night,
            raw_data_root: PathBuf::from("rawdata"),
            obsdb: PathBuf::from("obsdb.json"),
            output_root: self.output_root,
            bands: self.bands,
            ccds: self.ccds,
            parallelism: self.parallelism,
            verbose: false,
            wcs_config: Vec::new(),
            epoch: self.epoch,
            flags: ProcessingFlags::for_epoch(self.epoch),
            resume: self.resume,
        }
    }
}

/// An observation log with `frames_per_band` exposures in each band.
///
/// Exposure ids look like `d<night>.<band>.<nnnn>`.
#[must_use]
pub fn observation_log(night: &Night, bands: &[&str], frames_per_band: usize) -> StaticObservationLog {
    bands.iter().fold(StaticObservationLog::new(), |log, band| {
        let frames = (1..=frames_per_band).map(|i| format!("d{night}.{band}.{i:04}"));
        log.with_frames(night, *band, frames)
    })
}
