//! The three configuration layers, lowest precedence first:
//! built-in defaults, environment, explicit overrides.

use super::Epoch;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Raw-data root.
pub const ENV_RAW_DATA: &str = "BASSDATA";
/// Directory holding the observation database.
pub const ENV_OBSDB_DIR: &str = "BASSDIR";
/// Reduction output root.
pub const ENV_OUTPUT_ROOT: &str = "BASSRDXDIR";
/// Scratch filesystem; the output root falls back to `$GSCRATCH/rmreduce`.
pub const ENV_GSCRATCH: &str = "GSCRATCH";
/// Default parallelism.
pub const ENV_PROCESSES: &str = "BOKFLOW_PROCS";

/// File name of the observation database inside `$BASSDIR`.
pub const OBSDB_FILE_NAME: &str = "bass-newtiles-observed.json";

/// Source of environment variables.
///
/// The resolver reads the environment only through this trait, once, so no
/// stage ever consults ambient process state.
pub trait EnvSource: Send + Sync {
    /// Returns the value of a variable, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    /// Raw-data root.
    pub raw_data_root: PathBuf,
    /// Observation database.
    pub obsdb: PathBuf,
    /// Output root.
    pub output_root: PathBuf,
    /// Worker count.
    pub parallelism: usize,
    /// CCDs processed when no subset is requested.
    pub ccds: Vec<u8>,
    /// Camera epoch.
    pub epoch: Epoch,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            raw_data_root: PathBuf::from("rawdata"),
            obsdb: PathBuf::from("obsdb.json"),
            output_root: PathBuf::from("rdx"),
            parallelism: 1,
            ccds: vec![1, 2, 3, 4],
            epoch: Epoch::Current,
        }
    }
}

/// Values sourced from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvLayer {
    /// Raw-data root.
    pub raw_data_root: Option<PathBuf>,
    /// Observation database.
    pub obsdb: Option<PathBuf>,
    /// Output root.
    pub output_root: Option<PathBuf>,
    /// Worker count.
    pub parallelism: Option<usize>,
}

impl EnvLayer {
    /// Reads the layer from an environment source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` if the parallelism variable is not
    /// a number.
    pub fn from_source(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let output_root = env.var(ENV_OUTPUT_ROOT).map(PathBuf::from).or_else(|| {
            env.var(ENV_GSCRATCH)
                .map(|scratch| PathBuf::from(scratch).join("rmreduce"))
        });

        let parallelism = match env.var(ENV_PROCESSES) {
            Some(value) => Some(value.trim().parse::<usize>().map_err(|_| {
                ConfigError::InvalidEnv {
                    var: ENV_PROCESSES.to_string(),
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            raw_data_root: env.var(ENV_RAW_DATA).map(PathBuf::from),
            obsdb: env
                .var(ENV_OBSDB_DIR)
                .map(|dir| PathBuf::from(dir).join(OBSDB_FILE_NAME)),
            output_root,
            parallelism,
        })
    }
}

/// Explicit run parameters, highest precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOverrides {
    /// Observing night, `YYYYMMDD`. Mandatory.
    pub night: Option<String>,
    /// Raw-data root.
    pub raw_data_root: Option<PathBuf>,
    /// Observation database.
    pub obsdb: Option<PathBuf>,
    /// Output root.
    pub output_root: Option<PathBuf>,
    /// Band filter; entries may be comma-separated lists.
    pub bands: Vec<String>,
    /// CCD subset.
    pub ccds: Vec<u8>,
    /// Worker count.
    pub parallelism: Option<usize>,
    /// Verbose logging.
    pub verbose: bool,
    /// WCS config files; entries may be comma-separated lists.
    pub wcs_config: Vec<String>,
    /// Camera epoch.
    pub epoch: Option<Epoch>,
    /// Skip weight-map generation.
    pub no_weight_maps: bool,
    /// Skip stages with a matching completion marker.
    pub resume: bool,
}

impl RunOverrides {
    /// Creates empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the night.
    #[must_use]
    pub fn with_night(mut self, night: impl Into<String>) -> Self {
        self.night = Some(night.into());
        self
    }

    /// Sets the raw-data root.
    #[must_use]
    pub fn with_raw_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_data_root = Some(path.into());
        self
    }

    /// Sets the observation database.
    #[must_use]
    pub fn with_obsdb(mut self, path: impl Into<PathBuf>) -> Self {
        self.obsdb = Some(path.into());
        self
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = Some(path.into());
        self
    }

    /// Adds a band (or comma-separated bands).
    #[must_use]
    pub fn with_band(mut self, band: impl Into<String>) -> Self {
        self.bands.push(band.into());
        self
    }

    /// Sets the CCD subset.
    #[must_use]
    pub fn with_ccds(mut self, ccds: impl IntoIterator<Item = u8>) -> Self {
        self.ccds = ccds.into_iter().collect();
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Adds a WCS config reference (or comma-separated references).
    #[must_use]
    pub fn with_wcs_config(mut self, files: impl Into<String>) -> Self {
        self.wcs_config.push(files.into());
        self
    }

    /// Sets the camera epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Enables resumption from completion markers.
    #[must_use]
    pub fn resuming(mut self) -> Self {
        self.resume = true;
        self
    }
}

/// Splits comma-separated list entries, trimming and dropping empties.
pub(crate) fn split_list(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
