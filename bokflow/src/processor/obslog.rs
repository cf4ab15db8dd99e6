//! Per-night listings of observed exposures.

use crate::core::Night;
use crate::errors::ObservationLogError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lists the exposures taken on a night.
pub trait ObservationLog: Send + Sync {
    /// Returns the bands observed on a night, sorted. A night with no
    /// observations yields an empty list.
    fn bands(&self, night: &Night) -> Vec<String>;

    /// Returns the exposure ids of one band on a night, in log order.
    fn frames(&self, night: &Night, band: &str) -> Vec<String>;
}

type NightTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// In-memory observation log.
#[derive(Debug, Clone, Default)]
pub struct StaticObservationLog {
    nights: NightTable,
}

impl StaticObservationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds exposures for a band on a night.
    #[must_use]
    pub fn with_frames(
        mut self,
        night: &Night,
        band: impl Into<String>,
        frames: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.nights
            .entry(night.as_str().to_string())
            .or_default()
            .entry(band.into())
            .or_default()
            .extend(frames.into_iter().map(Into::into));
        self
    }
}

impl ObservationLog for StaticObservationLog {
    fn bands(&self, night: &Night) -> Vec<String> {
        self.nights
            .get(night.as_str())
            .map(|bands| bands.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn frames(&self, night: &Night, band: &str) -> Vec<String> {
        self.nights
            .get(night.as_str())
            .and_then(|bands| bands.get(band))
            .cloned()
            .unwrap_or_default()
    }
}

/// Observation log read from a JSON file of the form
/// `{ "<night>": { "<band>": ["<frame id>", ...] } }`.
#[derive(Debug, Clone)]
pub struct JsonObservationLog {
    path: PathBuf,
    inner: StaticObservationLog,
}

impl JsonObservationLog {
    /// Loads the log from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not in the
    /// expected shape.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ObservationLogError> {
        let path = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ObservationLogError::Read {
                path: path.clone(),
                source,
            })?;
        let nights: NightTable =
            serde_json::from_str(&text).map_err(|e| ObservationLogError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), nights = nights.len(), "Loaded observation log");
        Ok(Self {
            path,
            inner: StaticObservationLog { nights },
        })
    }

    /// Returns the file the log was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObservationLog for JsonObservationLog {
    fn bands(&self, night: &Night) -> Vec<String> {
        self.inner.bands(night)
    }

    fn frames(&self, night: &Night, band: &str) -> Vec<String> {
        self.inner.frames(night, band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn night() -> Night {
        Night::parse("20210615").unwrap()
    }

    #[test]
    fn test_static_log() {
        let log = StaticObservationLog::new()
            .with_frames(&night(), "r", ["d1", "d2"])
            .with_frames(&night(), "g", ["d3"]);

        assert_eq!(log.bands(&night()), vec!["g", "r"]);
        assert_eq!(log.frames(&night(), "r"), vec!["d1", "d2"]);
        assert!(log.frames(&night(), "z").is_empty());
        assert!(log.bands(&Night::parse("20210616").unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_json_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obsdb.json");
        std::fs::write(&path, r#"{"20210615": {"g": ["d7001.0001", "d7001.0002"]}}"#).unwrap();

        let log = JsonObservationLog::load(&path).await.unwrap();
        assert_eq!(log.bands(&night()), vec!["g"]);
        assert_eq!(log.frames(&night(), "g").len(), 2);
        assert_eq!(log.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_json_log_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = JsonObservationLog::load(dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(missing, ObservationLogError::Read { .. }));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"20210615": ["d1"]}"#).unwrap();
        let bad = JsonObservationLog::load(&path).await.unwrap_err();
        assert!(matches!(bad, ObservationLogError::Parse { .. }));
    }
}
