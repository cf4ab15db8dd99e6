//! Run configuration.
//!
//! This module provides:
//! - The three configuration layers (defaults, environment, overrides)
//! - The resolver that merges them and validates auxiliary files
//! - The immutable `RunConfig` and the epoch flag bundles

mod layers;
mod resolver;
mod run;

pub use layers::{
    ConfigDefaults, EnvLayer, EnvSource, ProcessEnv, RunOverrides, ENV_GSCRATCH, ENV_OBSDB_DIR,
    ENV_OUTPUT_ROOT, ENV_PROCESSES, ENV_RAW_DATA, OBSDB_FILE_NAME,
};
pub use resolver::ConfigResolver;
pub use run::{Epoch, ProcessingFlags, RunConfig};
