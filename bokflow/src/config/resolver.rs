//! Merges the configuration layers into a [`RunConfig`].

use super::layers::{split_list, ConfigDefaults, EnvLayer, EnvSource, ProcessEnv, RunOverrides};
use super::{ProcessingFlags, RunConfig};
use crate::core::{validate_segment, Night};
use crate::errors::{BokflowError, ConfigError, MissingFileError};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Builds the run configuration.
///
/// Precedence, highest first: explicit overrides, environment, defaults.
#[derive(Clone)]
pub struct ConfigResolver {
    defaults: ConfigDefaults,
    env: Arc<dyn EnvSource>,
}

impl ConfigResolver {
    /// Creates a resolver reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            defaults: ConfigDefaults::default(),
            env: Arc::new(ProcessEnv),
        }
    }

    /// Replaces the built-in defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: ConfigDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replaces the environment source.
    #[must_use]
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Resolves the run configuration.
    ///
    /// Filesystem existence checks on the WCS config files run here, before
    /// any stage can start.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for a missing or malformed mandatory parameter,
    /// and `MissingFileError` listing every absent WCS config file.
    pub fn resolve(&self, overrides: &RunOverrides) -> Result<RunConfig, BokflowError> {
        let night = match overrides.night.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingNight.into()),
            Some(value) => Night::parse(value)?,
        };

        let env = EnvLayer::from_source(self.env.as_ref())?;

        let raw_data_root = overrides
            .raw_data_root
            .clone()
            .or(env.raw_data_root)
            .unwrap_or_else(|| self.defaults.raw_data_root.clone());
        let obsdb = overrides
            .obsdb
            .clone()
            .or(env.obsdb)
            .unwrap_or_else(|| self.defaults.obsdb.clone());
        let output_root = overrides
            .output_root
            .clone()
            .or(env.output_root)
            .unwrap_or_else(|| self.defaults.output_root.clone());

        let requested = overrides
            .parallelism
            .or(env.parallelism)
            .unwrap_or(self.defaults.parallelism);
        let parallelism =
            NonZeroUsize::new(requested).ok_or(ConfigError::InvalidParallelism(requested))?;

        let bands = resolve_bands(&overrides.bands)?;
        let ccds = resolve_ccds(if overrides.ccds.is_empty() {
            &self.defaults.ccds
        } else {
            &overrides.ccds
        })?;

        let wcs_config = check_files(&split_list(&overrides.wcs_config))?;

        let epoch = overrides.epoch.unwrap_or(self.defaults.epoch);
        let flags = ProcessingFlags::for_epoch(epoch).with_no_weight_maps(overrides.no_weight_maps);

        debug!(
            night = %night,
            epoch = %epoch,
            parallelism = parallelism.get(),
            bands = ?bands,
            ccds = ?ccds,
            output_root = %output_root.display(),
            "Resolved run configuration"
        );

        Ok(RunConfig {
            night,
            raw_data_root,
            obsdb,
            output_root,
            bands,
            ccds,
            parallelism,
            verbose: overrides.verbose,
            wcs_config,
            epoch,
            flags,
            resume: overrides.resume,
        })
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

fn resolve_bands(entries: &[String]) -> Result<BTreeSet<String>, ConfigError> {
    split_list(entries)
        .into_iter()
        .map(|band| {
            validate_segment("band", &band).map_err(|_| ConfigError::InvalidBand(band.clone()))?;
            Ok(band)
        })
        .collect()
}

fn resolve_ccds(ccds: &[u8]) -> Result<BTreeSet<u8>, ConfigError> {
    ccds.iter()
        .map(|&ccd| {
            if (1..=4).contains(&ccd) {
                Ok(ccd)
            } else {
                Err(ConfigError::InvalidCcd(ccd))
            }
        })
        .collect()
}

/// Checks every file, reporting all missing ones together.
fn check_files(files: &[String]) -> Result<Vec<PathBuf>, MissingFileError> {
    let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.is_file()).cloned().collect();
    if missing.is_empty() {
        Ok(paths)
    } else {
        Err(MissingFileError::new(missing))
    }
}
