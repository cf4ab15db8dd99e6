//! The seams to the pixel processing and to the observation database.
//!
//! The pipeline never touches pixel data itself. Every unit of work is
//! handed to a [`FrameProcessor`] as a [`UnitRequest`], and the set of
//! exposures to process comes from an [`ObservationLog`].

mod command;
mod obslog;

pub use command::CommandProcessor;
pub use obslog::{JsonObservationLog, ObservationLog, StaticObservationLog};

use crate::config::ProcessingFlags;
use crate::core::{Night, WorkUnit};
use crate::registry::StageFlags;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Everything a processor needs to handle one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRequest {
    /// The stage being run.
    pub stage: String,
    /// Frame type the stage produces.
    pub frame_type: String,
    /// The observing night.
    pub night: Night,
    /// The unit of work.
    pub unit: WorkUnit,
    /// Raw exposures root.
    pub raw_data_root: PathBuf,
    /// Directories holding consumed products.
    pub inputs: Vec<PathBuf>,
    /// Output file for this unit.
    pub output: PathBuf,
    /// Stage switches.
    pub stage_flags: StageFlags,
    /// Run-wide processing switches.
    pub processing_flags: ProcessingFlags,
    /// WCS solver configuration files.
    pub wcs_config: Vec<PathBuf>,
}

impl UnitRequest {
    /// Returns every active switch, stage switches first.
    #[must_use]
    pub fn active_flags(&self) -> Vec<&'static str> {
        let mut flags = self.stage_flags.active();
        flags.extend(self.processing_flags.active());
        flags
    }
}

/// Failure of a processor on one unit.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The external program could not be started.
    #[error("Cannot run '{program}': {source}")]
    Spawn {
        /// The program.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The external program exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        /// The program.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Preparing the output location failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Applies one stage to one unit of work.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    /// Processes the unit, writing `request.output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be processed.
    async fn apply(&self, request: &UnitRequest) -> Result<(), ProcessorError>;
}
