//! Prepares, uploads and cleans up every enabled destination.

use super::{average, TaskStep};
use crate::config::BuildConfig;
use crate::context::DestinationContext;
use crate::core::StepType;
use crate::destinations::{Destination, UploadResult};
use crate::pipeline::branches::BranchSet;
use crate::pipeline::guard::{guarded, panic_message};
use crate::pipeline::run::TaskRun;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UploadStep;

impl TaskStep for UploadStep {
    fn step_type(&self) -> StepType {
        StepType::Upload
    }

    fn spawn_branches(&self, run: &Arc<TaskRun>, branches: &mut BranchSet) {
        for (slot, (config_index, config)) in run.enabled_configs().iter().enumerate() {
            let destinations: Vec<Arc<dyn Destination>> = config
                .enabled_destinations()
                .map(|(_, destination)| Arc::clone(destination))
                .collect();
            branches.spawn(
                format!("upload[{config_index}]"),
                upload_config(Arc::clone(run), slot),
                Box::new(move || average(destinations.iter().map(|destination| destination.upload_progress()))),
            );
        }
    }
}

/// Uploads to every enabled destination of one config concurrently.
///
/// One destination failing does not stop the others.
async fn upload_config(run: Arc<TaskRun>, slot: usize) -> bool {
    let (config_index, config) = &run.enabled_configs()[slot];
    let config_index = *config_index;

    let Some(cached_path) = run.cached_location(config_index) else {
        run.report()
            .new_report(StepType::Upload, config_index, 0)
            .lock()
            .set_failed(format!("Config '{}' has no cached build to upload", config.name));
        return false;
    };
    let description = run
        .config_format(config_index, config)
        .format(&run.settings().build_description);

    let uploads = config.enabled_destinations().map(|(destination_index, destination)| {
        upload_one(
            &run,
            config_index,
            config,
            destination_index,
            destination.as_ref(),
            cached_path.clone(),
            description.clone(),
        )
    });
    join_all(uploads).await.into_iter().all(|uploaded| uploaded)
}

async fn upload_one(
    run: &TaskRun,
    config_index: usize,
    config: &BuildConfig,
    destination_index: usize,
    destination: &dyn Destination,
    cached_path: PathBuf,
    description: String,
) -> bool {
    let step = run
        .report()
        .new_report(StepType::Upload, config_index, destination_index);
    destination.run_state().reset();
    let ctx = DestinationContext {
        branch: run.branch_context(config_index, config, step.clone()),
        destination_index,
        cached_path,
        description,
    };
    let name = destination.display_name();

    let prepared = guarded(
        &step,
        run.cancel_token(),
        |err| format!("Failed to prepare {name}: {err}"),
        destination.prepare(&ctx),
    )
    .await;
    let uploaded = prepared
        && guarded(
            &step,
            run.cancel_token(),
            |err| format!("Upload to {name} failed: {err}"),
            destination.upload(&ctx),
        )
        .await;

    if let Err(payload) = AssertUnwindSafe(destination.clean_up()).catch_unwind().await {
        warn!(
            destination = %name,
            config_index,
            destination_index,
            "Clean-up panicked: {}",
            panic_message(payload.as_ref())
        );
    }
    destination.run_state().finish();

    let result = if uploaded {
        UploadResult::success()
    } else {
        let reason = step
            .lock()
            .fail_reason()
            .map_or_else(|| "Upload failed".to_string(), str::to_string);
        UploadResult::failure(reason)
    };
    run.record_upload(config_index, destination_index, result);
    uploaded
}
