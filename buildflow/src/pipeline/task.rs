//! The upload task: runs the fixed stage sequence over a set of build configs.

use super::branches::BranchSet;
use super::progress::{NoOpProgressSink, ProgressSink};
use super::run::{TaskRun, UploadFailure};
use super::stages::pipeline_steps;
use crate::cancellation::CancellationToken;
use crate::config::{BuildConfig, PipelineSettings};
use crate::context::run_blocking;
use crate::core::{StepType, TaskState};
use crate::errors::{BuildflowError, BuildflowResult};
use crate::format::{FormatContext, FormatLayer};
use crate::fsops::FsError;
use crate::report::Report;
use crate::services::ServiceContext;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Called once when a stage fails, with the stage, the headline message and the full report.
pub type StageFailedCallback = Arc<dyn Fn(StepType, &str, &Report) + Send + Sync>;

/// How a run ended.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Whether every stage succeeded.
    pub success: bool,
    /// The stage that failed, if any.
    pub failed_step: Option<StepType>,
    /// Headline message; on failure it lists each failing config's reason.
    pub message: String,
    /// Duration of the run in milliseconds.
    pub duration_ms: f64,
    run: Arc<TaskRun>,
}

impl TaskOutcome {
    /// The run's report.
    #[must_use]
    pub fn report(&self) -> &Report {
        self.run.report()
    }

    /// The run's shared state.
    #[must_use]
    pub fn run(&self) -> &Arc<TaskRun> {
        &self.run
    }

    /// Every destination that did not succeed.
    #[must_use]
    pub fn upload_failures(&self) -> Vec<UploadFailure> {
        self.run.upload_failures()
    }

    /// The cache folder of config `index`, if caching succeeded for it.
    #[must_use]
    pub fn cached_location(&self, index: usize) -> Option<PathBuf> {
        self.run.cached_location(index)
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.run.cancel_token().is_cancelled()
    }
}

/// Fetches, caches, modifies and uploads a set of build configs.
///
/// Each stage runs one branch per enabled config concurrently and only
/// starts once every branch of the previous stage has finished. A stage
/// with any failed branch stops the run.
///
/// # Example
///
/// ```rust,ignore
/// let task = UploadTask::new("nightly")
///     .with_config(
///         BuildConfig::new("Windows")
///             .with_source(LocalPathSource::new("builds/win"))
///             .with_destination(LocalPathDestination::new("out/{configName}")),
///     )
///     .with_progress_sink(Arc::new(LoggingProgressSink::info()));
///
/// let outcome = task.run().await?;
/// ```
pub struct UploadTask {
    name: String,
    configs: Vec<BuildConfig>,
    settings: Arc<PipelineSettings>,
    services: Arc<ServiceContext>,
    format: FormatContext,
    progress: Arc<dyn ProgressSink>,
    on_stage_failed: Option<StageFailedCallback>,
    state: RwLock<TaskState>,
    cancel: RwLock<Arc<CancellationToken>>,
}

impl UploadTask {
    /// Creates a task with no configs and default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configs: Vec::new(),
            settings: Arc::new(PipelineSettings::default()),
            services: Arc::new(ServiceContext::new()),
            format: FormatContext::process(),
            progress: Arc::new(NoOpProgressSink),
            on_stage_failed: None,
            state: RwLock::new(TaskState::NotStarted),
            cancel: RwLock::new(Arc::new(CancellationToken::new())),
        }
    }

    /// Adds a config.
    #[must_use]
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Adds several configs.
    #[must_use]
    pub fn with_configs(mut self, configs: impl IntoIterator<Item = BuildConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Replaces the pipeline settings.
    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Replaces the service context.
    #[must_use]
    pub fn with_services(mut self, services: Arc<ServiceContext>) -> Self {
        self.services = services;
        self
    }

    /// Replaces the base formatting context (process-wide values by default).
    #[must_use]
    pub fn with_format_context(mut self, format: FormatContext) -> Self {
        self.format = format;
        self
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Sets the stage failure callback.
    #[must_use]
    pub fn on_stage_failed(mut self, callback: impl Fn(StepType, &str, &Report) + Send + Sync + 'static) -> Self {
        self.on_stage_failed = Some(Arc::new(callback));
        self
    }

    /// The task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every config, enabled or not.
    #[must_use]
    pub fn configs(&self) -> &[BuildConfig] {
        &self.configs
    }

    /// The pipeline settings.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The service context.
    #[must_use]
    pub fn services(&self) -> &Arc<ServiceContext> {
        &self.services
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    fn task_format(&self) -> FormatContext {
        self.format
            .child(FormatLayer::new().with("taskName", self.name.clone()))
    }

    /// Configuration issues that prevent a run. Empty when the task can run.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let format = self.task_format();
        let mut issues = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for (index, config) in self.configs.iter().enumerate() {
            if let Some(first) = seen.insert(config.guid(), index) {
                issues.push(format!(
                    "Configs {first} and {index} share the GUID '{}'",
                    config.guid()
                ));
            }
            if config.enabled {
                issues.extend(config.validate(index, &format.child(config.format_layer(index))));
            }
        }
        issues
    }

    /// Cancels the current run. Branches observe it before their next call or file.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.read().cancel(reason);
    }

    fn set_state(&self, state: TaskState) {
        *self.state.write() = state;
        self.progress.on_state_changed(state);
    }

    fn begin(&self) -> BuildflowResult<Arc<CancellationToken>> {
        let mut state = self.state.write();
        if state.is_running() {
            return Err(BuildflowError::Internal(format!(
                "Task '{}' is already running",
                self.name
            )));
        }
        // Claimed under the lock that checked it.
        *state = TaskState::GettingSources;
        let token = Arc::new(CancellationToken::new());
        *self.cancel.write() = Arc::clone(&token);
        Ok(token)
    }

    /// Runs every stage once.
    ///
    /// Returns `Err` only when the task cannot start: it is already running
    /// or [`validate`](Self::validate) reports issues. Branch failures are
    /// recorded in the outcome's report.
    pub async fn run(&self) -> BuildflowResult<TaskOutcome> {
        let issues = self.validate();
        if !issues.is_empty() {
            return Err(BuildflowError::InvalidConfiguration(issues));
        }
        let cancel = self.begin()?;
        let started = Instant::now();

        for config in self.configs.iter().filter(|config| config.enabled) {
            for (_, entry) in config.enabled_sources() {
                entry.source.run_state().reset();
            }
            for (_, destination) in config.enabled_destinations() {
                destination.run_state().reset();
            }
        }

        let run = Arc::new(TaskRun::new(
            &self.configs,
            Arc::clone(&self.settings),
            Arc::clone(&self.services),
            self.task_format(),
            cancel,
        ));
        info!(
            task = %self.name,
            configs = run.enabled_configs().len(),
            "Starting upload task"
        );

        for step in pipeline_steps() {
            let step_type = step.step_type();
            self.set_state(step_type.running_state());

            let mut branches = BranchSet::new();
            step.spawn_branches(&run, &mut branches);
            let status = step_type.status_label();
            let sink = Arc::clone(&self.progress);
            let passed = branches
                .join(self.settings.poll_interval(), |fraction| {
                    sink.on_progress(step_type, status, fraction);
                })
                .instrument(info_span!("stage", step = %step_type))
                .await;

            if !passed {
                let message = failure_message(step_type, &run);
                error!(task = %self.name, step = %step_type, "{}", message);
                if let Some(callback) = &self.on_stage_failed {
                    callback(step_type, &message, run.report());
                }
                self.set_state(TaskState::Completed { success: false });
                return Ok(TaskOutcome {
                    success: false,
                    failed_step: Some(step_type),
                    message,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    run,
                });
            }
        }

        if self.settings.delete_cache_after_upload {
            delete_cache_folders(run.cached_locations()).await;
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(task = %self.name, duration_ms, "Upload task completed");
        self.set_state(TaskState::Completed { success: true });
        Ok(TaskOutcome {
            success: true,
            failed_step: None,
            message: format!("Task '{}' completed", self.name),
            duration_ms,
            run,
        })
    }
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("name", &self.name)
            .field("configs", &self.configs.len())
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("has_stage_failed_callback", &self.on_stage_failed.is_some())
            .finish_non_exhaustive()
    }
}

/// `"<status> failed"` followed by one line per failed step of `step`.
fn failure_message(step: StepType, run: &TaskRun) -> String {
    let mut message = format!("{} failed", step.status_label());
    for failure in run.report().failures_for(step) {
        let name = run
            .config(failure.key.config_index)
            .map_or("?", |config| config.name.as_str());
        let _ = write!(message, "\n- Config '{name}' ({}): {}", failure.key, failure.reason);
    }
    message
}

async fn delete_cache_folders(folders: Vec<PathBuf>) {
    let removal = run_blocking(move || {
        for folder in folders.iter().filter(|folder| folder.exists()) {
            std::fs::remove_dir_all(folder).map_err(|err| FsError::io("cache.delete", folder, err))?;
        }
        Ok(())
    })
    .await;
    if let Err(err) = removal {
        warn!(error = %err, "Failed to delete cache folders after upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDestination, MockSource};
    use std::time::Duration;

    #[test]
    fn test_new_task_is_not_started() {
        let task = UploadTask::new("nightly");
        assert_eq!(task.state(), TaskState::NotStarted);
        assert!(task.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_config_issues() {
        let task = UploadTask::new("nightly").with_config(BuildConfig::new("Empty"));
        let issues = task.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("Config 0 ('Empty') has no enabled sources"));
    }

    #[test]
    fn test_validate_skips_disabled_configs() {
        let task = UploadTask::new("nightly").with_config(BuildConfig::new("Empty").enabled(false));
        assert!(task.validate().is_empty());
    }

    #[test]
    fn test_validate_detects_shared_guid() {
        let config = BuildConfig::new("Windows")
            .with_source(MockSource::new("/tmp/build"))
            .with_destination(MockDestination::new());
        let copy = BuildConfig::with_guid(config.guid().to_string(), "Copy")
            .with_source(MockSource::new("/tmp/build"))
            .with_destination(MockDestination::new());

        let issues = UploadTask::new("nightly").with_configs([config, copy]).validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Configs 0 and 1 share the GUID"));
    }

    #[test]
    fn test_begin_claims_the_task() {
        let task = UploadTask::new("nightly");
        let first = task.begin().unwrap();
        assert_eq!(task.state(), TaskState::GettingSources);

        let err = task.begin().unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert!(Arc::ptr_eq(&first, &task.cancel.read()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_start_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let build = dir.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("game.exe"), "exe").unwrap();
        let task = Arc::new(
            UploadTask::new("nightly")
                .with_settings(
                    PipelineSettings::default()
                        .with_cache_root(dir.path().join("cache"))
                        .with_poll_interval_ms(5),
                )
                .with_config(
                    BuildConfig::new("Windows")
                        .with_source(MockSource::new(&build).with_delay(Duration::from_millis(40)))
                        .with_destination(MockDestination::new()),
                ),
        );

        let runs: Vec<_> = (0..8)
            .map(|_| {
                let task = Arc::clone(&task);
                tokio::spawn(async move { task.run().await })
            })
            .collect();
        let mut started = 0;
        for run in runs {
            if run.await.unwrap().is_ok() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_invalid_task_refuses_to_run() {
        let task = UploadTask::new("nightly").with_config(BuildConfig::new("Empty"));
        let err = task.run().await.unwrap_err();
        assert!(matches!(err, BuildflowError::InvalidConfiguration(_)));
        assert_eq!(task.state(), TaskState::NotStarted);
    }
}
