//! Units of parallel work.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently processable piece of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkUnit {
    /// A single exposure in one band.
    Frame {
        /// Band the exposure was taken in.
        band: String,
        /// Exposure identifier from the observation log.
        frame: String,
    },
    /// One CCD of the focal plane, across all bands.
    Ccd {
        /// CCD number, 1-4.
        ccd: u8,
    },
    /// Every exposure of one band.
    Band {
        /// The band.
        band: String,
    },
}

impl WorkUnit {
    /// Creates a frame unit.
    #[must_use]
    pub fn frame(band: impl Into<String>, frame: impl Into<String>) -> Self {
        Self::Frame {
            band: band.into(),
            frame: frame.into(),
        }
    }

    /// Creates a CCD unit.
    #[must_use]
    pub fn ccd(ccd: u8) -> Self {
        Self::Ccd { ccd }
    }

    /// Creates a band unit.
    #[must_use]
    pub fn band_unit(band: impl Into<String>) -> Self {
        Self::Band { band: band.into() }
    }

    /// Returns the band this unit is restricted to, if any.
    #[must_use]
    pub fn band(&self) -> Option<&str> {
        match self {
            Self::Frame { band, .. } | Self::Band { band } => Some(band),
            Self::Ccd { .. } => None,
        }
    }

    /// Returns the name of the unit's output file, without extension.
    ///
    /// Unique within one artifact directory.
    #[must_use]
    pub fn file_stem(&self) -> String {
        match self {
            Self::Frame { frame, .. } => frame.clone(),
            Self::Ccd { ccd } => format!("ccd{ccd}"),
            Self::Band { band } => band.clone(),
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame { band, frame } => write!(f, "{band}/{frame}"),
            Self::Ccd { ccd } => write!(f, "ccd{ccd}"),
            Self::Band { band } => write!(f, "{band}"),
        }
    }
}
