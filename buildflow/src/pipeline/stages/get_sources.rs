//! Fetches every enabled source of every enabled config.

use super::{average, TaskStep};
use crate::core::StepType;
use crate::pipeline::branches::BranchSet;
use crate::pipeline::guard::guarded;
use crate::pipeline::run::TaskRun;
use crate::sources::Source;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GetSourcesStep;

impl TaskStep for GetSourcesStep {
    fn step_type(&self) -> StepType {
        StepType::GetSources
    }

    fn spawn_branches(&self, run: &Arc<TaskRun>, branches: &mut BranchSet) {
        for (slot, (config_index, config)) in run.enabled_configs().iter().enumerate() {
            let sources: Vec<Arc<dyn Source>> = config
                .enabled_sources()
                .map(|(_, entry)| entry.source.clone())
                .collect();
            branches.spawn(
                format!("get_sources[{config_index}]"),
                fetch_config(Arc::clone(run), slot),
                Box::new(move || average(sources.iter().map(|source| source.download_progress()))),
            );
        }
    }
}

/// Fetches the config's sources in order, stopping at the first failure.
async fn fetch_config(run: Arc<TaskRun>, slot: usize) -> bool {
    let (config_index, config) = &run.enabled_configs()[slot];

    for (source_index, entry) in config.enabled_sources() {
        let step = run
            .report()
            .new_report(StepType::GetSources, *config_index, source_index);
        let ctx = run.branch_context(*config_index, config, step.clone());
        let name = entry.source.display_name();

        let fetched = guarded(
            &step,
            run.cancel_token(),
            |err| format!("Failed to fetch {name} for config '{}': {err}", config.name),
            entry.source.fetch(&ctx),
        )
        .await;
        if !fetched {
            return false;
        }
    }
    true
}
