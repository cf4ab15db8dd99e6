//! Stage definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage's work is split into independent units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One unit per exposure, within each band.
    #[default]
    Frame,
    /// One unit per CCD; products are band independent.
    Ccd,
    /// One unit per band.
    Band,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame => write!(f, "frame"),
            Self::Ccd => write!(f, "ccd"),
            Self::Band => write!(f, "band"),
        }
    }
}

/// Stage-specific switches layered over the run's processing flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageFlags {
    /// Write output to the scratch tree.
    pub scratch_output: bool,
    /// Skip fringe correction.
    pub no_fringe_correction: bool,
    /// Skip illumination correction.
    pub no_illum_correction: bool,
    /// Skip sky-flat correction.
    pub no_sky_flat: bool,
    /// Fit and subtract a polynomial sky.
    pub sky_subtract: bool,
    /// Tag distinguishing this pass from other passes over the same frame type.
    pub process_key: Option<String>,
}

impl StageFlags {
    /// Creates empty flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes output to the scratch tree under a process key.
    #[must_use]
    pub fn scratch(mut self, process_key: impl Into<String>) -> Self {
        self.scratch_output = true;
        self.process_key = Some(process_key.into());
        self
    }

    /// Disables fringe correction.
    #[must_use]
    pub fn without_fringe(mut self) -> Self {
        self.no_fringe_correction = true;
        self
    }

    /// Disables illumination correction.
    #[must_use]
    pub fn without_illum(mut self) -> Self {
        self.no_illum_correction = true;
        self
    }

    /// Disables sky-flat correction.
    #[must_use]
    pub fn without_sky_flat(mut self) -> Self {
        self.no_sky_flat = true;
        self
    }

    /// Enables sky subtraction.
    #[must_use]
    pub fn with_sky_subtraction(mut self) -> Self {
        self.sky_subtract = true;
        self
    }

    /// Names of the active switches, in a fixed order.
    #[must_use]
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.scratch_output, "tmpdir"),
            (self.no_fringe_correction, "nofringecorr"),
            (self.no_illum_correction, "noillumcorr"),
            (self.no_sky_flat, "noskyflatcorr"),
            (self.sky_subtract, "skysub"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// A named processing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    /// Unique stage name.
    pub name: String,
    /// Direct predecessors, in declaration order.
    pub predecessors: Vec<String>,
    /// Stages that should run first when both are planned, without being
    /// pulled in automatically.
    pub soft_predecessors: Vec<String>,
    /// Stages whose products this stage reads.
    pub inputs: Vec<String>,
    /// Frame type of the product.
    pub produces: String,
    /// Parallel granularity.
    pub granularity: Granularity,
    /// Stage switches.
    pub flags: StageFlags,
}

impl StageDef {
    /// Creates a stage producing `produces`, with no predecessors.
    #[must_use]
    pub fn new(name: impl Into<String>, produces: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predecessors: Vec::new(),
            soft_predecessors: Vec::new(),
            inputs: Vec::new(),
            produces: produces.into(),
            granularity: Granularity::Frame,
            flags: StageFlags::default(),
        }
    }

    /// Sets the direct predecessors.
    #[must_use]
    pub fn after(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.predecessors = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the soft predecessors.
    #[must_use]
    pub fn softly_after(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.soft_predecessors = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the stages whose products are read.
    #[must_use]
    pub fn reading(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the parallel granularity.
    #[must_use]
    pub fn per(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the stage flags.
    #[must_use]
    pub fn with_flags(mut self, flags: StageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns true if the product goes to the scratch tree.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.flags.scratch_output
    }
}
