//! Runs each config's modifier chain over its cached folder.

use super::TaskStep;
use crate::core::StepType;
use crate::pipeline::branches::BranchSet;
use crate::pipeline::guard::guarded;
use crate::pipeline::run::TaskRun;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ModifyCachedSourcesStep;

impl TaskStep for ModifyCachedSourcesStep {
    fn step_type(&self) -> StepType {
        StepType::ModifyCachedSources
    }

    fn spawn_branches(&self, run: &Arc<TaskRun>, branches: &mut BranchSet) {
        for (slot, (config_index, config)) in run.enabled_configs().iter().enumerate() {
            let total = config.enabled_modifiers().count();
            let done = Arc::new(AtomicUsize::new(0));
            let sampled = Arc::clone(&done);
            branches.spawn(
                format!("modify_cached_sources[{config_index}]"),
                modify_config(Arc::clone(run), slot, done),
                Box::new(move || {
                    if total == 0 {
                        return 1.0;
                    }
                    #[allow(clippy::cast_precision_loss)]
                    let fraction = sampled.load(Ordering::Acquire) as f32 / total as f32;
                    fraction
                }),
            );
        }
    }
}

/// Applies the config's modifiers in order, stopping at the first failure.
async fn modify_config(run: Arc<TaskRun>, slot: usize, done: Arc<AtomicUsize>) -> bool {
    let (config_index, config) = &run.enabled_configs()[slot];
    let config_index = *config_index;

    let Some(cached_path) = run.cached_location(config_index) else {
        run.report()
            .new_report(StepType::ModifyCachedSources, config_index, 0)
            .lock()
            .set_failed(format!("Config '{}' has no cached build to modify", config.name));
        return false;
    };

    for (modifier_index, modifier) in config.enabled_modifiers() {
        let step = run
            .report()
            .new_report(StepType::ModifyCachedSources, config_index, modifier_index);
        let ctx = run.branch_context(config_index, config, step.clone());
        let name = modifier.display_name();

        let modified = guarded(
            &step,
            run.cancel_token(),
            |err| format!("{name} failed for config '{}': {err}", config.name),
            modifier.modify_build_at_path(&cached_path, &ctx),
        )
        .await;
        if !modified {
            return false;
        }
        done.fetch_add(1, Ordering::AcqRel);
    }
    true
}
