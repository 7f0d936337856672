//! Core domain model types for buildflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Step type and task state enums
//! - The duplicate-file policy shared by every copy operation
//! - Transient component run state

mod run_state;
mod status;

pub use run_state::{ProgressHandle, RunState};
pub use status::{DuplicateFileHandling, StepType, TaskState};
