//! # Bokflow
//!
//! Stage scheduling and run configuration for the Bok CCD reduction
//! pipeline.
//!
//! Bokflow decides *what* runs and *where* products go; the pixel work is
//! delegated to a [`processor::FrameProcessor`]:
//!
//! - **Configuration**: defaults, environment and explicit overrides merged
//!   into one immutable `RunConfig`, with auxiliary files checked up front
//! - **Stage registry**: the reduction stages, their dependencies, and the
//!   two-pass sky-flat derivation
//! - **Scheduling**: deterministic topological plans with cycle detection
//! - **Artifacts**: collision-free permanent and scratch locations, scratch
//!   lifetime, and completion markers for resumed runs
//! - **Execution**: sequential stages with bounded parallelism inside each
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bokflow::prelude::*;
//!
//! let config = ConfigResolver::new()
//!     .resolve(&RunOverrides::new().with_night("20210615"))?;
//! let registry = Arc::new(StageRegistry::standard());
//! let plan = StageScheduler::new(&registry).plan(&["skyflat"])?;
//!
//! let runner = PipelineRunner::new(registry, processor, obslog);
//! let report = runner.execute(&plan, &config).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactTracker, CompletionMarker, StageIo};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ConfigResolver, Epoch, ProcessingFlags, RunConfig, RunOverrides};
    pub use crate::core::{ArtifactKey, Night, StageStatus, UnitStatus, WorkUnit};
    pub use crate::errors::{
        BokflowError, ConfigError, CycleError, ErrorInfo, MissingFileError, StageOrderViolation,
        UnitFailure, UnknownStageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        ExecutionPlan, PathAssignment, PipelineRunner, RunReport, StageReport, StageScheduler,
    };
    pub use crate::processor::{
        CommandProcessor, FrameProcessor, JsonObservationLog, ObservationLog, ProcessorError,
        StaticObservationLog, UnitRequest,
    };
    pub use crate::registry::{Granularity, StageDef, StageFlags, StageRegistry};
}
