//! Artifact locations and stage completion state.
//!
//! Every product lives either in the permanent tree or in the scratch tree
//! under the configured output root:
//!
//! ```text
//! <output_root>/rdx/<night>/<band>/<frame_type>/<process_key>/<unit>.fits
//! <output_root>/tmp/<night>/<band>/<process_key>/<frame_type>/<unit>.fits
//! <output_root>/rdx/<night>/.done/<stage>.json
//! ```
//!
//! Key components are validated path segments, so distinct keys never share
//! a directory and the two trees never overlap.

mod marker;
mod tracker;

pub use marker::{stage_params_hash, CompletionMarker};
pub use tracker::{ArtifactTracker, StageIo, MARKER_DIR, PERMANENT_DIR, SCRATCH_DIR};
