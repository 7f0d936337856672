//! Step type, task state and duplicate-file policy enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Fetch every enabled source.
    GetSources,
    /// Copy or extract fetched artifacts into the per-config cache folder.
    CacheSources,
    /// Run the modifier chain over each cached folder.
    ModifyCachedSources,
    /// Prepare, upload and clean up every enabled destination.
    Upload,
}

impl StepType {
    /// All steps in execution order.
    pub const ALL: [Self; 4] = [
        Self::GetSources,
        Self::CacheSources,
        Self::ModifyCachedSources,
        Self::Upload,
    ];

    /// Human-readable status label used for progress reporting.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::GetSources => "Getting sources",
            Self::CacheSources => "Caching sources",
            Self::ModifyCachedSources => "Modifying cached sources",
            Self::Upload => "Uploading",
        }
    }

    /// The task state entered while this step runs.
    #[must_use]
    pub fn running_state(&self) -> TaskState {
        match self {
            Self::GetSources => TaskState::GettingSources,
            Self::CacheSources => TaskState::CachingSources,
            Self::ModifyCachedSources => TaskState::ModifyingSources,
            Self::Upload => TaskState::Uploading,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetSources => write!(f, "get_sources"),
            Self::CacheSources => write!(f, "cache_sources"),
            Self::ModifyCachedSources => write!(f, "modify_cached_sources"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// Lifecycle of a single task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    /// `run()` has not been called yet.
    NotStarted,
    /// Fetching sources.
    GettingSources,
    /// Caching fetched sources.
    CachingSources,
    /// Running modifiers.
    ModifyingSources,
    /// Uploading to destinations.
    Uploading,
    /// The run finished.
    Completed {
        /// Whether every stage succeeded.
        success: bool,
    },
}

impl Default for TaskState {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl TaskState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns true if the run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Completed { .. })
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::GettingSources => write!(f, "getting_sources"),
            Self::CachingSources => write!(f, "caching_sources"),
            Self::ModifyingSources => write!(f, "modifying_sources"),
            Self::Uploading => write!(f, "uploading"),
            Self::Completed { success: true } => write!(f, "completed"),
            Self::Completed { success: false } => write!(f, "failed"),
        }
    }
}

/// What a copy does when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DuplicateFileHandling {
    /// Replace the existing file.
    Overwrite,
    /// Keep the existing file and continue.
    Skip,
    /// Abort the copy.
    #[default]
    Error,
}

impl fmt::Display for DuplicateFileHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "Overwrite"),
            Self::Skip => write!(f, "Skip"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_order() {
        let mut steps = StepType::ALL.to_vec();
        steps.reverse();
        steps.sort();
        assert_eq!(steps, StepType::ALL.to_vec());
    }

    #[test]
    fn test_step_type_display() {
        assert_eq!(StepType::GetSources.to_string(), "get_sources");
        assert_eq!(StepType::ModifyCachedSources.to_string(), "modify_cached_sources");
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(TaskState::Completed { success: false }.is_terminal());
        assert!(!TaskState::Uploading.is_terminal());
        assert!(TaskState::Uploading.is_running());
        assert!(!TaskState::NotStarted.is_running());
    }

    #[test]
    fn test_task_state_serialize() {
        let json = serde_json::to_string(&TaskState::Completed { success: true }).unwrap();
        assert_eq!(json, r#"{"state":"completed","success":true}"#);
    }

    #[test]
    fn test_duplicate_handling_default_is_error() {
        assert_eq!(DuplicateFileHandling::default(), DuplicateFileHandling::Error);
        let json = serde_json::to_string(&DuplicateFileHandling::Skip).unwrap();
        assert_eq!(json, r#""Skip""#);
    }
}
