//! Testing utilities for buildflow tasks.
//!
//! This module provides:
//! - Mock sources, modifiers and destinations with call counters
//! - Ready-made branch and destination contexts

mod fixtures;
mod mocks;

pub use fixtures::{branch_context, destination_context, TEST_CONFIG_NAME};
pub use mocks::{CountingModifier, MockDestination, MockSource};
