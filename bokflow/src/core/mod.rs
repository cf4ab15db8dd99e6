//! Core domain types shared by every component:
//! - the observing night
//! - artifact keys
//! - stage and unit status enums
//! - units of parallel work

mod artifact;
mod night;
mod status;
mod unit;

pub use artifact::{ArtifactKey, ALL_BANDS, DEFAULT_PROCESS_KEY};
pub(crate) use artifact::validate_segment;
pub use night::Night;
pub use status::{StageStatus, UnitStatus};
pub use unit::WorkUnit;
