//! Observing night identifier.

use crate::errors::ConfigError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An observing night in `YYYYMMDD` form.
///
/// Always a real calendar date; the string form is kept verbatim because it
/// names directories in both output trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Night(String);

impl Night {
    /// Parses a night identifier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNight` unless the value is eight digits
    /// forming a valid date.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidNight(value.to_string()));
        }
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|_| ConfigError::InvalidNight(value.to_string()))?;
        Ok(Self(value.to_string()))
    }

    /// Returns the night as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the calendar date of the night.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y%m%d").ok()
    }
}

impl fmt::Display for Night {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Night {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Night {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Night> for String {
    fn from(night: Night) -> Self {
        night.0
    }
}
