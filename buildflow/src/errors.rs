//! Error types for the buildflow pipeline.
//!
//! Branch-level failures never escape a stage: they are converted into
//! [`StepResult`](crate::report::StepResult) entries. The variants here are
//! what component calls return before that conversion happens.

use crate::fsops::FsError;
use thiserror::Error;

/// The main error type for buildflow operations.
#[derive(Debug, Error)]
pub enum BuildflowError {
    /// The task configuration has one or more issues; the run was not started.
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// A filesystem operation failed.
    #[error("{0}")]
    Fs(#[from] FsError),

    /// A source could not fetch its artifact.
    #[error("Source failed: {0}")]
    Source(String),

    /// A modifier could not alter the cached build.
    #[error("Modifier failed: {0}")]
    Modifier(String),

    /// A destination could not prepare or upload.
    #[error("Destination failed: {0}")]
    Destination(String),

    /// A component type key has no registered factory.
    #[error("Unknown {kind} type '{key}'")]
    UnknownComponent {
        /// Component family ("source", "modifier", "destination").
        kind: &'static str,
        /// The unregistered key.
        key: String,
    },

    /// A required external service is not registered in the service context.
    #[error("Service '{0}' is not registered")]
    MissingService(String),

    /// The run was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BuildflowError {
    /// Creates a source error.
    #[must_use]
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Creates a modifier error.
    #[must_use]
    pub fn modifier(message: impl Into<String>) -> Self {
        Self::Modifier(message.into())
    }

    /// Creates a destination error.
    #[must_use]
    pub fn destination(message: impl Into<String>) -> Self {
        Self::Destination(message.into())
    }

    /// Returns true if this error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::Fs(FsError::Cancelled))
    }
}

/// Result alias used across the crate.
pub type BuildflowResult<T> = Result<T, BuildflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_invalid_configuration_joins_issues() {
        let err = BuildflowError::InvalidConfiguration(vec![
            "Config 0 has no sources".to_string(),
            "Config 1 has no destinations".to_string(),
        ]);

        assert_eq!(
            err.to_string(),
            "Invalid configuration: Config 0 has no sources; Config 1 has no destinations"
        );
    }

    #[test]
    fn test_unknown_component_message() {
        let err = BuildflowError::UnknownComponent {
            kind: "destination",
            key: "ftp".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown destination type 'ftp'");
    }

    #[test]
    fn test_fs_error_is_transparent() {
        let err: BuildflowError = FsError::DuplicateFile {
            path: PathBuf::from("/tmp/out/game.exe"),
        }
        .into();
        assert!(err.to_string().contains("/tmp/out/game.exe"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(BuildflowError::Cancelled("user".into()).is_cancelled());
        assert!(BuildflowError::Fs(FsError::Cancelled).is_cancelled());
        assert!(!BuildflowError::source("boom").is_cancelled());
    }
}
