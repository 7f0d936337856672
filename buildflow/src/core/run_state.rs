//! Transient run state carried by sources and destinations.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A shared progress value clamped to `[0, 1]`.
///
/// Cloning the handle shares the underlying value, so a branch can write it
/// while the stage runner samples it.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    bits: Arc<AtomicU32>,
}

impl ProgressHandle {
    /// Creates a new handle at 0.0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress. Values outside `[0, 1]` (and NaN) are clamped.
    pub fn set(&self, value: f32) {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.bits.store(clamped.to_bits(), Ordering::Release);
    }

    /// Sets progress from a `done / total` ratio. A zero total counts as done.
    pub fn set_ratio(&self, done: usize, total: usize) {
        if total == 0 {
            self.set(1.0);
        } else {
            #[allow(clippy::cast_precision_loss)]
            self.set(done as f32 / total as f32);
        }
    }

    /// Returns the current progress.
    #[must_use]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Run-scoped state for a component: progress, in-progress flag and a status line.
///
/// Never persisted. Cloning produces a fresh, reset state.
#[derive(Debug, Default)]
pub struct RunState {
    progress: ProgressHandle,
    in_progress: AtomicBool,
    description: RwLock<String>,
}

impl RunState {
    /// Creates a new, reset run state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field for a new run.
    pub fn reset(&self) {
        self.progress.set(0.0);
        self.in_progress.store(false, Ordering::SeqCst);
        self.description.write().clear();
    }

    /// Marks the component as working with a status line.
    pub fn begin(&self, description: impl Into<String>) {
        self.in_progress.store(true, Ordering::SeqCst);
        *self.description.write() = description.into();
    }

    /// Marks the component as idle.
    pub fn finish(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// Returns the progress handle.
    #[must_use]
    pub fn progress_handle(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Returns the current progress.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    /// Sets the progress.
    pub fn set_progress(&self, value: f32) {
        self.progress.set(value);
    }

    /// Returns true while the component is working.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Returns the current status line.
    #[must_use]
    pub fn description(&self) -> String {
        self.description.read().clone()
    }

    /// Replaces the status line.
    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write() = description.into();
    }
}

impl Clone for RunState {
    fn clone(&self) -> Self {
        Self::new()
    }
}

// Run state is transient and never part of a component's identity.
impl PartialEq for RunState {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
