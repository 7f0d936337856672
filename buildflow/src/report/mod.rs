//! Structured run reports.
//!
//! Every branch of every stage gets its own [`StepResult`] slot in the
//! [`Report`], keyed by `(step, config index, item index)`. Slots are
//! append-only and a failure is never cleared.

mod step_result;
mod tree;

pub use step_result::{LogEntry, LogLevel, StepResult, StepResultHandle};
pub use tree::{FailureRecord, Report, ReportKey, ReportSnapshot, StepSnapshot};
