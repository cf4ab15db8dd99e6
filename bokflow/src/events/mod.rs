//! Run events.
//!
//! The runner reports progress through an [`EventSink`]. Event types are
//! dotted names; payloads are JSON objects carrying the run id and the
//! stage or unit involved.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started.
pub const RUN_STARTED: &str = "run.started";
/// Every planned stage finished.
pub const RUN_COMPLETED: &str = "run.completed";
/// The run stopped on an error.
pub const RUN_FAILED: &str = "run.failed";
/// A stage began dispatching units.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished with every unit successful.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage was skipped because its completion marker matched.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage had at least one failed unit.
pub const STAGE_FAILED: &str = "stage.failed";
/// A single unit failed.
pub const UNIT_FAILED: &str = "unit.failed";
/// The scratch tree for a night was removed.
pub const SCRATCH_CLEANED: &str = "scratch.cleaned";
