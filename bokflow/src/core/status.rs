//! Stage and unit status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a completed stage was satisfied.
///
/// A failed stage never reaches a report; it ends the run with
/// [`UnitFailure`](crate::errors::UnitFailure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Every unit of the stage succeeded.
    Ok,
    /// Stage was skipped because a matching completion marker exists.
    Skip,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// The outcome of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// The processor reported success.
    Ok,
    /// The processor reported failure.
    Fail,
    /// Never handed to the processor because a sibling failed first.
    NotDispatched,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
            Self::NotDispatched => write!(f, "not_dispatched"),
        }
    }
}
