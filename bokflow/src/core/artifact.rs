//! Artifact identity.

use super::Night;
use crate::errors::ArtifactKeyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process key for finalized products.
pub const DEFAULT_PROCESS_KEY: &str = "final";

/// Band label for band-independent products (bias, bad-pixel masks).
pub const ALL_BANDS: &str = "all";

/// Identifies a calibration or science product.
///
/// Two passes over the same frame type during a multi-pass derivation differ
/// only by `process_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    frame_type: String,
    night: Night,
    band: String,
    process_key: String,
}

impl ArtifactKey {
    /// Creates a new artifact key.
    ///
    /// # Errors
    ///
    /// Returns an error if any component is not a plain path segment.
    pub fn new(
        frame_type: impl Into<String>,
        night: Night,
        band: impl Into<String>,
        process_key: impl Into<String>,
    ) -> Result<Self, ArtifactKeyError> {
        let frame_type = frame_type.into();
        let band = band.into();
        let process_key = process_key.into();
        validate_segment("frame type", &frame_type)?;
        validate_segment("band", &band)?;
        validate_segment("process key", &process_key)?;
        Ok(Self {
            frame_type,
            night,
            band,
            process_key,
        })
    }

    /// Returns the frame type.
    #[must_use]
    pub fn frame_type(&self) -> &str {
        &self.frame_type
    }

    /// Returns the night.
    #[must_use]
    pub fn night(&self) -> &Night {
        &self.night
    }

    /// Returns the band.
    #[must_use]
    pub fn band(&self) -> &str {
        &self.band
    }

    /// Returns the process key.
    #[must_use]
    pub fn process_key(&self) -> &str {
        &self.process_key
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}/{}/{}]",
            self.frame_type, self.night, self.band, self.process_key
        )
    }
}

/// Checks that a value can be used verbatim as one path segment.
pub(crate) fn validate_segment(field: &'static str, value: &str) -> Result<(), ArtifactKeyError> {
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok {
        Ok(())
    } else {
        Err(ArtifactKeyError {
            field,
            value: value.to_string(),
        })
    }
}
