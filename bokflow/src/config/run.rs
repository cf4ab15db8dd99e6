//! The resolved, immutable run configuration.

use crate::core::Night;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Camera epoch, before or after the detector upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Epoch {
    /// Data taken before the upgrade.
    Legacy,
    /// Data taken after the upgrade.
    #[default]
    Current,
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Current => write!(f, "current"),
        }
    }
}

/// Per-run processing switches handed to the frame processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProcessingFlags {
    /// Skip pixel-flat correction.
    pub no_pixel_flat: bool,
    /// Apply the ramp correction.
    pub ramp_correction: bool,
    /// Skip 2-D bias correction.
    pub no_bias_correction: bool,
    /// Repair saturated pixels.
    pub fix_saturation: bool,
    /// Skip weight-map generation.
    pub no_weight_maps: bool,
}

impl ProcessingFlags {
    /// Returns the flag bundle for an epoch. Exactly one bundle is active
    /// per run.
    #[must_use]
    pub fn for_epoch(epoch: Epoch) -> Self {
        match epoch {
            Epoch::Legacy => Self {
                no_pixel_flat: true,
                ramp_correction: true,
                no_bias_correction: true,
                fix_saturation: false,
                no_weight_maps: false,
            },
            Epoch::Current => Self {
                no_pixel_flat: true,
                ramp_correction: false,
                no_bias_correction: true,
                fix_saturation: true,
                no_weight_maps: false,
            },
        }
    }

    /// Sets weight-map suppression.
    #[must_use]
    pub fn with_no_weight_maps(mut self, no_weight_maps: bool) -> Self {
        self.no_weight_maps = no_weight_maps;
        self
    }

    /// Names of the active switches, in a fixed order.
    #[must_use]
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.no_pixel_flat, "nopixflat"),
            (self.ramp_correction, "rampcorr"),
            (self.no_bias_correction, "nobiascorr"),
            (self.fix_saturation, "fixsaturation"),
            (self.no_weight_maps, "noweightmap"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// The immutable configuration of one pipeline run.
///
/// Built once by [`super::ConfigResolver`] and passed explicitly to every
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub(crate) night: Night,
    pub(crate) raw_data_root: PathBuf,
    pub(crate) obsdb: PathBuf,
    pub(crate) output_root: PathBuf,
    pub(crate) bands: BTreeSet<String>,
    pub(crate) ccds: BTreeSet<u8>,
    pub(crate) parallelism: NonZeroUsize,
    pub(crate) verbose: bool,
    pub(crate) wcs_config: Vec<PathBuf>,
    pub(crate) epoch: Epoch,
    pub(crate) flags: ProcessingFlags,
    pub(crate) resume: bool,
}

impl RunConfig {
    /// Returns the observing night.
    #[must_use]
    pub fn night(&self) -> &Night {
        &self.night
    }

    /// Returns the raw-data root.
    #[must_use]
    pub fn raw_data_root(&self) -> &Path {
        &self.raw_data_root
    }

    /// Returns the observation database reference.
    #[must_use]
    pub fn obsdb(&self) -> &Path {
        &self.obsdb
    }

    /// Returns the output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Returns the band filter; empty means every band observed that night.
    #[must_use]
    pub fn bands(&self) -> &BTreeSet<String> {
        &self.bands
    }

    /// Returns the CCD subset.
    #[must_use]
    pub fn ccds(&self) -> &BTreeSet<u8> {
        &self.ccds
    }

    /// Returns the number of concurrent units per stage.
    #[must_use]
    pub fn parallelism(&self) -> NonZeroUsize {
        self.parallelism
    }

    /// Returns whether verbose output was requested.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Returns the validated WCS config files.
    #[must_use]
    pub fn wcs_config(&self) -> &[PathBuf] {
        &self.wcs_config
    }

    /// Returns the camera epoch.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Returns the active processing flags.
    #[must_use]
    pub fn flags(&self) -> ProcessingFlags {
        self.flags
    }

    /// Returns whether completed stages are skipped.
    #[must_use]
    pub fn resume(&self) -> bool {
        self.resume
    }

    /// Stable digest of every setting that influences processing output.
    ///
    /// Paths to the raw data and outputs, verbosity, parallelism and resume
    /// do not change what a stage produces and are left out.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let view = serde_json::json!({
            "night": self.night,
            "bands": self.bands,
            "ccds": self.ccds,
            "epoch": self.epoch,
            "flags": self.flags,
            "wcs_config": self.wcs_config,
        });
        let json = serde_json::to_string(&view).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_bundle() {
        let flags = ProcessingFlags::for_epoch(Epoch::Legacy);
        assert!(flags.no_pixel_flat);
        assert!(flags.ramp_correction);
        assert!(flags.no_bias_correction);
        assert!(!flags.fix_saturation);
        assert_eq!(flags.active(), vec!["nopixflat", "rampcorr", "nobiascorr"]);
    }

    #[test]
    fn test_current_bundle() {
        let flags = ProcessingFlags::for_epoch(Epoch::Current);
        assert!(flags.no_pixel_flat);
        assert!(!flags.ramp_correction);
        assert!(flags.no_bias_correction);
        assert!(flags.fix_saturation);
        assert_eq!(
            flags.with_no_weight_maps(true).active(),
            vec!["nopixflat", "nobiascorr", "fixsaturation", "noweightmap"]
        );
    }

    #[test]
    fn test_epoch_default_and_display() {
        assert_eq!(Epoch::default(), Epoch::Current);
        assert_eq!(Epoch::Legacy.to_string(), "legacy");
    }
}
