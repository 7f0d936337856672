//! Progress sinks for task runs.

use crate::core::{StepType, TaskState};
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// One progress sample of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// The running stage.
    pub step: StepType,
    /// Human-readable status.
    pub status: String,
    /// Completion fraction in `[0, 1]`, non-decreasing within a stage.
    pub fraction: f32,
}

/// Receives progress samples and state changes of a task run.
///
/// Implementations must not block; they are called from the stage join loop.
pub trait ProgressSink: Send + Sync {
    /// Called on every progress sample.
    fn on_progress(&self, step: StepType, status: &str, fraction: f32);

    /// Called when the task changes state.
    fn on_state_changed(&self, _state: TaskState) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn on_progress(&self, _step: StepType, _status: &str, _fraction: f32) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingProgressSink {
    /// Creates a sink logging samples at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl ProgressSink for LoggingProgressSink {
    fn on_progress(&self, step: StepType, status: &str, fraction: f32) {
        let percent = fraction * 100.0;
        if self.level == Level::INFO {
            info!(step = %step, percent = format_args!("{percent:.0}"), "{}", status);
        } else {
            debug!(step = %step, percent = format_args!("{percent:.0}"), "{}", status);
        }
    }

    fn on_state_changed(&self, state: TaskState) {
        info!(state = %state, "Task state changed");
    }
}

/// Records every sample, for tests.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    updates: RwLock<Vec<ProgressUpdate>>,
    states: RwLock<Vec<TaskState>>,
}

impl CollectingProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded sample.
    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.read().clone()
    }

    /// Samples of one stage, in order.
    #[must_use]
    pub fn fractions(&self, step: StepType) -> Vec<f32> {
        self.updates
            .read()
            .iter()
            .filter(|update| update.step == step)
            .map(|update| update.fraction)
            .collect()
    }

    /// Every recorded state, in order.
    #[must_use]
    pub fn states(&self) -> Vec<TaskState> {
        self.states.read().clone()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn on_progress(&self, step: StepType, status: &str, fraction: f32) {
        self.updates.write().push(ProgressUpdate {
            step,
            status: status.to_string(),
            fraction,
        });
    }

    fn on_state_changed(&self, state: TaskState) {
        self.states.write().push(state);
    }
}
