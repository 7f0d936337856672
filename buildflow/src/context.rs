//! Per-branch contexts handed to sources, modifiers and destinations.

use crate::cancellation::CancellationToken;
use crate::config::PipelineSettings;
use crate::errors::{BuildflowError, BuildflowResult};
use crate::format::FormatContext;
use crate::report::StepResultHandle;
use crate::services::ServiceContext;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one branch of one stage needs to do its work.
#[derive(Debug, Clone)]
pub struct BranchContext {
    /// Index of the config in the task.
    pub config_index: usize,
    /// Display name of the config.
    pub config_name: String,
    /// Stable GUID of the config.
    pub guid: String,
    /// Pipeline-wide settings.
    pub settings: Arc<PipelineSettings>,
    /// External clients.
    pub services: Arc<ServiceContext>,
    /// Config-level formatting context.
    pub format: FormatContext,
    /// Run-wide cancellation token.
    pub cancel: Arc<CancellationToken>,
    /// The step result owned by this branch.
    pub step: StepResultHandle,
}

impl BranchContext {
    /// Adds an informational entry to the branch's step result.
    pub fn log(&self, message: impl Into<String>) {
        self.step.lock().add_log(message);
    }

    /// Adds a warning to the branch's step result.
    pub fn warn(&self, message: impl Into<String>) {
        self.step.lock().add_warning(message);
    }

    /// Returns `Err(Cancelled)` if the run was cancelled.
    pub fn check_cancelled(&self) -> BuildflowResult<()> {
        self.cancel.check()
    }
}

/// Context passed to [`Source::fetch`](crate::sources::Source::fetch).
pub type SourceContext = BranchContext;

/// Context passed to [`Modifier::modify_build_at_path`](crate::modifiers::Modifier::modify_build_at_path).
pub type ModifyContext = BranchContext;

/// Context passed to destination `prepare` and `upload`.
#[derive(Debug, Clone)]
pub struct DestinationContext {
    /// The config-level branch context.
    pub branch: BranchContext,
    /// Index of the destination within the config.
    pub destination_index: usize,
    /// The cached folder to upload from.
    pub cached_path: PathBuf,
    /// The formatted build description.
    pub description: String,
}

impl std::ops::Deref for DestinationContext {
    type Target = BranchContext;

    fn deref(&self) -> &Self::Target {
        &self.branch
    }
}

/// Runs blocking filesystem work off the async worker threads.
pub(crate) async fn run_blocking<T, F>(work: F) -> BuildflowResult<T>
where
    F: FnOnce() -> BuildflowResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| BuildflowError::Internal(format!("Blocking task failed: {err}")))?
}
