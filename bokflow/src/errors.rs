//! Error types for bokflow.
//!
//! Every failure surfaces with its stage or unit context attached; nothing is
//! retried or swallowed inside the core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for bokflow operations.
#[derive(Debug, Error)]
pub enum BokflowError {
    /// A mandatory or malformed configuration parameter.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// One or more referenced auxiliary files are absent.
    #[error("{0}")]
    MissingFiles(#[from] MissingFileError),

    /// The stage registry contains a dependency cycle.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A requested stage or group name is not in the registry.
    #[error("{0}")]
    UnknownStage(#[from] UnknownStageError),

    /// The registry definitions are inconsistent.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A unit of work failed inside a stage.
    #[error("{0}")]
    UnitFailure(#[from] UnitFailure),

    /// A plan places a stage before one of its predecessors.
    #[error("{0}")]
    StageOrder(#[from] StageOrderViolation),

    /// A plan lists a stage more than once.
    #[error("{0}")]
    DuplicateStage(#[from] DuplicateStageError),

    /// An artifact key component is not usable as a path segment.
    #[error("{0}")]
    ArtifactKey(#[from] ArtifactKeyError),

    /// The observation log could not be read.
    #[error("{0}")]
    ObservationLog(#[from] ObservationLogError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BokflowError {
    /// Returns true for errors in what the user asked for, raised before any
    /// stage could run.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingFiles(_) | Self::UnknownStage(_) | Self::ObservationLog(_)
        )
    }

    /// Returns the diagnostic info for this error.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        match self {
            Self::Config(e) => e.info(),
            Self::MissingFiles(e) => e.info(),
            Self::Cycle(e) => e.info(),
            Self::UnknownStage(e) => e.info(),
            Self::Registry(e) => ErrorInfo::new("REGISTRY-001-INVALID", e.to_string()),
            Self::UnitFailure(e) => e.info(),
            Self::StageOrder(e) => e.info(),
            Self::DuplicateStage(e) => ErrorInfo::new("SCHED-004-DUPLICATE", e.to_string()),
            Self::ArtifactKey(e) => ErrorInfo::new("ARTIFACT-001-KEY", e.to_string()),
            Self::ObservationLog(e) => ErrorInfo::new("OBSLOG-001-READ", e.to_string()),
            Self::Io(e) => ErrorInfo::new("IO-001", e.to_string()),
        }
    }
}

/// Diagnostic metadata attached to an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "SCHED-002-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Errors raised while composing the run configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No observing night was supplied.
    #[error("Observing night is required but was not supplied")]
    MissingNight,

    /// The night is not a valid `YYYYMMDD` date.
    #[error("Invalid observing night '{0}': expected YYYYMMDD")]
    InvalidNight(String),

    /// Parallelism must be at least one.
    #[error("Parallelism must be at least 1 (got {0})")]
    InvalidParallelism(usize),

    /// A CCD number outside the focal plane.
    #[error("Invalid CCD number {0}: expected 1-4")]
    InvalidCcd(u8),

    /// A band name that cannot label an output directory.
    #[error("Invalid band name '{0}'")]
    InvalidBand(String),

    /// An environment variable held an unusable value.
    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidEnv {
        /// The variable name.
        var: String,
        /// The offending value.
        value: String,
    },
}

impl ConfigError {
    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        match self {
            Self::MissingNight => ErrorInfo::new("CONFIG-001-NIGHT", self.to_string())
                .with_fix_hint("Pass the observing night explicitly, e.g. --night 20210615."),
            Self::InvalidNight(_) => ErrorInfo::new("CONFIG-002-NIGHT_FORMAT", self.to_string()),
            Self::InvalidParallelism(_) => {
                ErrorInfo::new("CONFIG-003-PARALLELISM", self.to_string())
            }
            Self::InvalidCcd(_) => ErrorInfo::new("CONFIG-004-CCD", self.to_string()),
            Self::InvalidBand(_) => ErrorInfo::new("CONFIG-006-BAND", self.to_string()),
            Self::InvalidEnv { .. } => ErrorInfo::new("CONFIG-005-ENV", self.to_string()),
        }
    }
}

/// Referenced auxiliary files that do not exist.
///
/// Lists every missing file, in the order they were requested.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Missing configuration files: {}", display_paths(.missing))]
pub struct MissingFileError {
    /// All missing files.
    pub missing: Vec<PathBuf>,
}

impl MissingFileError {
    /// Creates a new missing file error.
    #[must_use]
    pub fn new(missing: Vec<PathBuf>) -> Self {
        Self { missing }
    }

    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new("CONFIG-010-MISSING_FILES", self.to_string())
            .with_fix_hint("Check the WCS config paths; all of them must exist before the run starts.")
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A dependency cycle between registry stages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cycle detected in stage registry: {}", .cycle_path.join(" -> "))]
pub struct CycleError {
    /// The stages forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }

    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new("SCHED-002-CYCLE", self.to_string())
            .with_fix_hint("Remove one of the dependencies in the cycle to break it.")
    }
}

/// A stage or group name the registry does not know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown stage or group '{name}'")]
pub struct UnknownStageError {
    /// The requested name.
    pub name: String,
}

impl UnknownStageError {
    /// Creates a new unknown stage error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new("SCHED-001-UNKNOWN", self.to_string())
            .with_fix_hint("Check for typos; use a stage name or one of the group names.")
    }
}

/// Inconsistent registry definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two stages share a name.
    #[error("Stage '{0}' is defined more than once")]
    DuplicateStage(String),

    /// A stage names a predecessor that is not defined.
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UndeclaredDependency {
        /// The dependent stage.
        stage: String,
        /// The missing predecessor.
        dependency: String,
    },

    /// A group references a stage that is not defined.
    #[error("Group '{group}' references unknown stage '{stage}'")]
    UndeclaredGroupMember {
        /// The group name.
        group: String,
        /// The missing stage.
        stage: String,
    },

    /// A scratch product is produced or read outside the derivation sequence.
    #[error("Stage '{stage}' touches scratch output of '{producer}' outside the derivation sequence")]
    ScratchLeak {
        /// The offending stage.
        stage: String,
        /// The stage whose output lives in the scratch tree.
        producer: String,
    },
}

/// One failed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    /// The unit identifier.
    pub unit: String,
    /// The processor's error message.
    pub error: String,
}

/// A stage failed because at least one of its units failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "Stage '{stage}' failed: {} unit(s) failed [{}]",
    .failed_units.len(),
    .failed_units.iter().map(|u| u.unit.as_str()).collect::<Vec<_>>().join(", ")
)]
pub struct UnitFailure {
    /// The failed stage.
    pub stage: String,
    /// Every unit that reported failure.
    pub failed_units: Vec<FailedUnit>,
    /// Units never dispatched because a sibling had already failed.
    pub not_dispatched: Vec<String>,
}

impl UnitFailure {
    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new("RUN-001-UNIT", self.to_string()).with_fix_hint(
            "Inspect the failed units; scratch products are kept for diagnosis. Rerun with --resume.",
        )
    }
}

/// A plan lists a stage before one of its direct predecessors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' is scheduled without its predecessor '{predecessor}' ahead of it")]
pub struct StageOrderViolation {
    /// The misplaced stage.
    pub stage: String,
    /// The predecessor that is missing or later in the plan.
    pub predecessor: String,
}

impl StageOrderViolation {
    /// Returns the diagnostic info.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new("SCHED-003-ORDER", self.to_string())
    }
}

/// A plan lists the same stage twice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' appears more than once in the plan")]
pub struct DuplicateStageError {
    /// The repeated stage.
    pub stage: String,
}

/// An artifact key component that cannot be used as a path segment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid artifact {field} '{value}'")]
pub struct ArtifactKeyError {
    /// Which component was rejected.
    pub field: &'static str,
    /// The rejected value.
    pub value: String,
}

/// Errors reading the observation log.
#[derive(Debug, Error)]
pub enum ObservationLogError {
    /// The log file could not be read.
    #[error("Cannot read observation log {path}: {source}")]
    Read {
        /// The log path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The log file is not valid.
    #[error("Malformed observation log {path}: {message}")]
    Parse {
        /// The log path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Nothing was observed on the night in the requested bands.
    #[error("No exposures recorded for night {night} in the requested bands {bands:?}")]
    NoObservations {
        /// The night.
        night: String,
        /// The requested bands; empty when no filter was given.
        bands: Vec<String>,
    },
}
