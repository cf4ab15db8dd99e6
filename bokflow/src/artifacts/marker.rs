//! Stage completion markers.

use crate::registry::StageDef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Record that a stage finished for a night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    /// The stage name.
    pub stage: String,
    /// Hash of the settings the stage ran with.
    pub params_hash: String,
    /// The run that wrote the marker.
    pub run_id: Uuid,
    /// When the stage finished.
    pub completed_at: DateTime<Utc>,
}

impl CompletionMarker {
    /// Creates a marker stamped with the current time.
    #[must_use]
    pub fn new(stage: impl Into<String>, params_hash: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            stage: stage.into(),
            params_hash: params_hash.into(),
            run_id,
            completed_at: Utc::now(),
        }
    }
}

/// Hashes the run fingerprint together with a stage's own switches.
///
/// A marker only matches when neither the run settings nor the stage
/// definition changed since it was written.
#[must_use]
pub fn stage_params_hash(fingerprint: &str, stage: &StageDef) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(stage.name.as_bytes());
    hasher.update(b"|");
    hasher.update(stage.produces.as_bytes());
    for flag in stage.flags.active() {
        hasher.update(b"|");
        hasher.update(flag.as_bytes());
    }
    if let Some(key) = &stage.flags.process_key {
        hasher.update(b"|key=");
        hasher.update(key.as_bytes());
    }
    let result = hasher.finalize();
    hex::encode(&result[..16])
}
