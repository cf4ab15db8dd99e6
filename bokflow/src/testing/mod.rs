//! Testing utilities for bokflow runs.
//!
//! This module provides:
//! - Processors that record calls and fail on demand
//! - A run configuration builder that bypasses the environment
//! - Observation log fixtures

mod fixtures;
mod mocks;

pub use fixtures::{observation_log, TestConfig};
pub use mocks::{ProcessorCall, ScriptedProcessor};
