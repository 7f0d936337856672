//! State shared by the branches of one task run.

use crate::cancellation::CancellationToken;
use crate::config::{BuildConfig, PipelineSettings};
use crate::context::BranchContext;
use crate::destinations::UploadResult;
use crate::format::FormatContext;
use crate::report::{Report, StepResultHandle};
use crate::services::ServiceContext;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A destination that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    /// Index of the config in the task.
    pub config_index: usize,
    /// Index of the destination in the config.
    pub destination_index: usize,
    /// Recorded failure reason.
    pub fail_reason: String,
}

/// Configs, cached locations, report and upload results of one run.
///
/// `cached_locations[i]` is written once, by config `i`'s caching branch,
/// after its caching succeeded.
#[derive(Debug)]
pub struct TaskRun {
    configs: Vec<(usize, BuildConfig)>,
    settings: Arc<PipelineSettings>,
    services: Arc<ServiceContext>,
    format: FormatContext,
    cancel: Arc<CancellationToken>,
    cached_locations: RwLock<Vec<Option<PathBuf>>>,
    report: Report,
    upload_results: Mutex<BTreeMap<(usize, usize), UploadResult>>,
}

impl TaskRun {
    pub(crate) fn new(
        configs: &[BuildConfig],
        settings: Arc<PipelineSettings>,
        services: Arc<ServiceContext>,
        format: FormatContext,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        let enabled = configs
            .iter()
            .enumerate()
            .filter(|(_, config)| config.enabled)
            .map(|(index, config)| (index, config.clone()))
            .collect();

        Self {
            configs: enabled,
            settings,
            services,
            format,
            cancel,
            cached_locations: RwLock::new(vec![None; configs.len()]),
            report: Report::new(),
            upload_results: Mutex::new(BTreeMap::new()),
        }
    }

    /// Enabled configs with their index in the task.
    #[must_use]
    pub fn enabled_configs(&self) -> &[(usize, BuildConfig)] {
        &self.configs
    }

    /// The enabled config at task index `index`.
    #[must_use]
    pub fn config(&self, index: usize) -> Option<&BuildConfig> {
        self.configs
            .iter()
            .find(|(config_index, _)| *config_index == index)
            .map(|(_, config)| config)
    }

    /// The run's report.
    #[must_use]
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// The run's settings.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// The cache folder of config `index`, once caching succeeded for it.
    #[must_use]
    pub fn cached_location(&self, index: usize) -> Option<PathBuf> {
        self.cached_locations.read().get(index).cloned().flatten()
    }

    /// Every populated cache folder.
    #[must_use]
    pub fn cached_locations(&self) -> Vec<PathBuf> {
        self.cached_locations.read().iter().flatten().cloned().collect()
    }

    pub(crate) fn set_cached_location(&self, index: usize, path: PathBuf) {
        if let Some(slot) = self.cached_locations.write().get_mut(index) {
            *slot = Some(path);
        }
    }

    /// Upload results keyed by `(config index, destination index)`.
    #[must_use]
    pub fn upload_results(&self) -> BTreeMap<(usize, usize), UploadResult> {
        self.upload_results.lock().clone()
    }

    pub(crate) fn record_upload(&self, config_index: usize, destination_index: usize, result: UploadResult) {
        self.upload_results
            .lock()
            .insert((config_index, destination_index), result);
    }

    /// Every destination that did not succeed, ordered by config then destination.
    #[must_use]
    pub fn upload_failures(&self) -> Vec<UploadFailure> {
        self.upload_results
            .lock()
            .iter()
            .filter(|(_, result)| !result.successful)
            .map(|((config_index, destination_index), result)| UploadFailure {
                config_index: *config_index,
                destination_index: *destination_index,
                fail_reason: result.fail_reason.clone(),
            })
            .collect()
    }

    /// The formatting context of config `index`.
    #[must_use]
    pub fn config_format(&self, index: usize, config: &BuildConfig) -> FormatContext {
        self.format.child(config.format_layer(index))
    }

    pub(crate) fn branch_context(&self, index: usize, config: &BuildConfig, step: StepResultHandle) -> BranchContext {
        BranchContext {
            config_index: index,
            config_name: config.name.clone(),
            guid: config.guid().to_string(),
            settings: self.settings.clone(),
            services: self.services.clone(),
            format: self.config_format(index, config),
            cancel: self.cancel.clone(),
            step,
        }
    }
}
