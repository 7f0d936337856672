//! The staged upload pipeline.
//!
//! [`UploadTask`] runs four fixed stages in order. Each stage fans out one
//! branch per enabled config onto the tokio runtime and fans back in with
//! a progress sampling tick; the stage result is the AND of its branches.

mod branches;
mod guard;
mod progress;
mod run;
mod stages;
mod task;


pub use branches::{BranchSet, ProgressFn};
pub use progress::{CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressSink, ProgressUpdate};
pub use run::{TaskRun, UploadFailure};
pub use task::{StageFailedCallback, TaskOutcome, UploadTask};
