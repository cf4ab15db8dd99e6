//! Maps artifact keys to filesystem locations.

use super::CompletionMarker;
use crate::core::{ArtifactKey, Night, WorkUnit, ALL_BANDS, DEFAULT_PROCESS_KEY};
use crate::errors::BokflowError;
use crate::registry::{Granularity, StageDef, StageRegistry};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Permanent products directory under the output root.
pub const PERMANENT_DIR: &str = "rdx";
/// Scratch directory under the output root.
pub const SCRATCH_DIR: &str = "tmp";
/// Completion marker directory under a night's permanent tree.
pub const MARKER_DIR: &str = ".done";

const UNIT_EXTENSION: &str = "fits";

/// Input and output locations of one unit of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIo {
    /// Directories holding consumed products, in the stage's input order.
    pub inputs: Vec<PathBuf>,
    /// Key of the produced artifact.
    pub output_key: ArtifactKey,
    /// Whether the product goes to the scratch tree.
    pub scratch: bool,
    /// The unit's output file.
    pub output: PathBuf,
}

/// Resolves artifact locations and tracks stage completion.
///
/// Path resolution is pure; only marker and cleanup operations touch the
/// filesystem.
#[derive(Debug, Clone)]
pub struct ArtifactTracker {
    output_root: PathBuf,
}

impl ArtifactTracker {
    /// Creates a tracker rooted at `output_root`.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Returns the output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Returns the directory for an artifact.
    ///
    /// Permanent and scratch layouts order the components differently so
    /// that a whole derivation pass can be inspected in one place.
    #[must_use]
    pub fn resolve_path(&self, key: &ArtifactKey, scratch: bool) -> PathBuf {
        if scratch {
            self.scratch_root(key.night())
                .join(key.band())
                .join(key.process_key())
                .join(key.frame_type())
        } else {
            self.permanent_root(key.night())
                .join(key.band())
                .join(key.frame_type())
                .join(key.process_key())
        }
    }

    /// Returns the output file of one unit.
    #[must_use]
    pub fn unit_path(&self, key: &ArtifactKey, scratch: bool, unit: &WorkUnit) -> PathBuf {
        self.resolve_path(key, scratch)
            .join(format!("{}.{UNIT_EXTENSION}", unit.file_stem()))
    }

    /// Returns the permanent tree of a night.
    #[must_use]
    pub fn permanent_root(&self, night: &Night) -> PathBuf {
        self.output_root.join(PERMANENT_DIR).join(night.as_str())
    }

    /// Returns the scratch tree of a night.
    #[must_use]
    pub fn scratch_root(&self, night: &Night) -> PathBuf {
        self.output_root.join(SCRATCH_DIR).join(night.as_str())
    }

    /// Returns the key a stage writes for a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the band of the unit is not a valid segment.
    pub fn output_key(
        &self,
        stage: &StageDef,
        night: &Night,
        unit: &WorkUnit,
    ) -> Result<ArtifactKey, BokflowError> {
        let band = match stage.granularity {
            Granularity::Ccd => ALL_BANDS,
            Granularity::Frame | Granularity::Band => unit.band().unwrap_or(ALL_BANDS),
        };
        let process_key = stage
            .flags
            .process_key
            .as_deref()
            .unwrap_or(DEFAULT_PROCESS_KEY);
        Ok(ArtifactKey::new(
            stage.produces.as_str(),
            night.clone(),
            band,
            process_key,
        )?)
    }

    /// Resolves where one unit of a stage reads from and writes to.
    ///
    /// A consumed product made per CCD is read from the band-independent
    /// directory. Otherwise the unit's own band is used; a unit that spans
    /// bands reads one directory per band in `bands`.
    ///
    /// # Errors
    ///
    /// Returns an error if an input stage is unknown or a key component is
    /// invalid.
    pub fn stage_io(
        &self,
        registry: &StageRegistry,
        stage: &StageDef,
        night: &Night,
        unit: &WorkUnit,
        bands: &[String],
    ) -> Result<StageIo, BokflowError> {
        let mut inputs = Vec::new();
        for input in &stage.inputs {
            let producer = registry.stage(input)?;
            let process_key = producer
                .flags
                .process_key
                .as_deref()
                .unwrap_or(DEFAULT_PROCESS_KEY);
            let input_bands: Vec<&str> = match (producer.granularity, unit.band()) {
                (Granularity::Ccd, _) => vec![ALL_BANDS],
                (_, Some(band)) => vec![band],
                (_, None) => bands.iter().map(String::as_str).collect(),
            };
            for band in input_bands {
                let key = ArtifactKey::new(
                    producer.produces.as_str(),
                    night.clone(),
                    band,
                    process_key,
                )?;
                inputs.push(self.resolve_path(&key, producer.is_scratch()));
            }
        }

        let output_key = self.output_key(stage, night, unit)?;
        let output = self.unit_path(&output_key, stage.is_scratch(), unit);
        Ok(StageIo {
            inputs,
            output_key,
            scratch: stage.is_scratch(),
            output,
        })
    }

    /// Removes the scratch tree of a night.
    ///
    /// Returns false if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the tree exists but cannot be removed.
    pub async fn cleanup_scratch(&self, night: &Night) -> io::Result<bool> {
        let root = self.scratch_root(night);
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {
                info!(night = %night, path = %root.display(), "Removed scratch tree");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns the completion marker path of a stage.
    #[must_use]
    pub fn marker_path(&self, night: &Night, stage: &str) -> PathBuf {
        self.permanent_root(night)
            .join(MARKER_DIR)
            .join(format!("{stage}.json"))
    }

    /// Writes a completion marker, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the marker cannot be written.
    pub async fn write_marker(
        &self,
        night: &Night,
        marker: &CompletionMarker,
    ) -> io::Result<PathBuf> {
        let path = self.marker_path(night, &marker.stage);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(marker)?;
        tokio::fs::write(&path, json).await?;
        debug!(stage = %marker.stage, path = %path.display(), "Wrote completion marker");
        Ok(path)
    }

    /// Removes the completion marker of a stage.
    ///
    /// Returns false if there was no marker.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the marker exists but cannot be removed.
    pub async fn remove_marker(&self, night: &Night, stage: &str) -> io::Result<bool> {
        let path = self.marker_path(night, stage);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(stage, path = %path.display(), "Removed completion marker");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads a completion marker. Missing or unreadable markers read as none.
    pub async fn read_marker(&self, night: &Night, stage: &str) -> Option<CompletionMarker> {
        let path = self.marker_path(night, stage);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(stage, path = %path.display(), error = %e, "Ignoring unreadable completion marker");
                None
            }
        }
    }

    /// Returns true if the stage has a marker written with `params_hash`.
    ///
    /// A marker with a different hash means the settings changed; the stage
    /// must run again.
    pub async fn is_complete(&self, night: &Night, stage: &str, params_hash: &str) -> bool {
        match self.read_marker(night, stage).await {
            Some(marker) if marker.params_hash == params_hash => true,
            Some(marker) => {
                warn!(
                    stage,
                    recorded = %marker.params_hash,
                    current = %params_hash,
                    "Completion marker parameters differ; stage will rerun"
                );
                false
            }
            None => false,
        }
    }
}
