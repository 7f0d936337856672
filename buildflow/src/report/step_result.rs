//! Per-step log accumulator.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared handle to a step result owned by exactly one branch.
pub type StepResultHandle = Arc<Mutex<StepResult>>;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational.
    Log,
    /// Something unexpected that did not fail the step.
    Warning,
    /// An error.
    Error,
}

/// One log line in a step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// The log/warning/error accumulator for one `(step, config, item)` triple.
///
/// Append-only: once [`set_failed`](Self::set_failed) has been called the
/// result stays failed and keeps its first failure reason.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepResult {
    label: String,
    logs: Vec<LogEntry>,
    failed: bool,
    fail_reason: Option<String>,
    exception: Option<String>,
}

impl StepResult {
    /// Creates an empty, successful step result.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Wraps a step result in a shareable handle.
    #[must_use]
    pub fn into_handle(self) -> StepResultHandle {
        Arc::new(Mutex::new(self))
    }

    /// Label used in tracing output, e.g. `upload[0.1]`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Adds an informational entry.
    pub fn add_log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(step = %self.label, "{}", message);
        self.push(LogLevel::Log, message);
    }

    /// Adds a warning entry.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(step = %self.label, "{}", message);
        self.push(LogLevel::Warning, message);
    }

    /// Adds an error entry without failing the step.
    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(step = %self.label, "{}", message);
        self.push(LogLevel::Error, message);
    }

    /// Fails the step. Only the first reason is kept; the reason is always logged.
    pub fn set_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.failed {
            self.failed = true;
            self.fail_reason = Some(reason.clone());
        }
        self.add_error(reason);
    }

    /// Records an error as the captured exception and fails the step with `reason`.
    ///
    /// The exception keeps the full `source()` chain for diagnostics.
    pub fn add_exception(&mut self, err: &(dyn std::error::Error + 'static), reason: impl Into<String>) {
        let chain: Vec<String> = std::iter::successors(Some(err), |e| e.source())
            .map(ToString::to_string)
            .collect();
        if self.exception.is_none() {
            self.exception = Some(chain.join(": caused by: "));
        }
        self.set_failed(reason);
    }

    /// Records a captured panic payload as the exception and fails the step.
    pub fn add_panic(&mut self, payload: &str, reason: impl Into<String>) {
        if self.exception.is_none() {
            self.exception = Some(format!("panic: {payload}"));
        }
        self.set_failed(reason);
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Returns true if the step has not failed.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        !self.failed
    }

    /// The first failure reason.
    #[must_use]
    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    /// The captured exception text.
    #[must_use]
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// All entries in order.
    #[must_use]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Entries of one severity.
    pub fn entries(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(move |entry| entry.level == level)
    }

    /// Returns true if any entry contains `needle`.
    #[must_use]
    pub fn contains_log(&self, needle: &str) -> bool {
        self.logs.iter().any(|entry| entry.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_step_result_is_successful() {
        let result = StepResult::new("get_sources[0.0]");
        assert!(result.is_successful());
        assert!(result.fail_reason().is_none());
        assert!(result.logs().is_empty());
    }

    #[test]
    fn test_levels_are_recorded_in_order() {
        let mut result = StepResult::new("test");
        result.add_log("one");
        result.add_warning("two");
        result.add_error("three");

        let levels: Vec<LogLevel> = result.logs().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Log, LogLevel::Warning, LogLevel::Error]);
        assert_eq!(result.entries(LogLevel::Warning).count(), 1);
        // add_error alone does not fail the step
        assert!(result.is_successful());
    }

    #[test]
    fn test_failure_is_sticky_and_first_reason_wins() {
        let mut result = StepResult::new("test");
        result.set_failed("first");
        result.set_failed("second");
        result.add_log("after failure");

        assert!(result.is_failed());
        assert_eq!(result.fail_reason(), Some("first"));
        assert!(result.contains_log("second"));
    }

    #[test]
    fn test_add_exception_captures_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.zip");
        let err = crate::fsops::FsError::io("copy_file", "/src/missing.zip", io);

        let mut result = StepResult::new("test");
        result.add_exception(&err, "Failed to cache '/src/missing.zip'");

        assert!(result.is_failed());
        let exception = result.exception().unwrap();
        assert!(exception.contains("missing.zip"));
        assert_eq!(result.fail_reason(), Some("Failed to cache '/src/missing.zip'"));
    }

    #[test]
    fn test_add_panic() {
        let mut result = StepResult::new("test");
        result.add_panic("index out of bounds", "Upload panicked");
        assert_eq!(result.exception(), Some("panic: index out of bounds"));
        assert!(result.is_failed());
    }
}
