//! The four fixed stages of an upload task.
//!
//! Each stage spawns one branch per enabled config. A config's branch owns
//! the report slots `(step, config index, item index)` it writes.

mod cache_sources;
mod get_sources;
mod modify;
mod upload;

pub(crate) use cache_sources::CacheSourcesStep;
pub(crate) use get_sources::GetSourcesStep;
pub(crate) use modify::ModifyCachedSourcesStep;
pub(crate) use upload::UploadStep;

use super::branches::BranchSet;
use super::run::TaskRun;
use crate::core::StepType;
use std::fmt::Debug;
use std::sync::Arc;

/// One stage of the pipeline.
pub(crate) trait TaskStep: Send + Sync + Debug {
    /// The stage this step implements.
    fn step_type(&self) -> StepType;

    /// Spawns one branch per enabled config of `run`.
    fn spawn_branches(&self, run: &Arc<TaskRun>, branches: &mut BranchSet);
}

/// The stages in execution order.
pub(crate) fn pipeline_steps() -> Vec<Box<dyn TaskStep>> {
    vec![
        Box::new(GetSourcesStep),
        Box::new(CacheSourcesStep),
        Box::new(ModifyCachedSourcesStep),
        Box::new(UploadStep),
    ]
}

/// Mean of progress values; an empty set counts as done.
pub(crate) fn average(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0_f32, 0_u32), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        1.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / count as f32;
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_in_order() {
        let order: Vec<StepType> = pipeline_steps().iter().map(|step| step.step_type()).collect();
        assert_eq!(order, StepType::ALL.to_vec());
    }

    #[test]
    fn test_average() {
        assert!((average(std::iter::empty()) - 1.0).abs() < f32::EPSILON);
        assert!((average([0.5, 1.0].into_iter()) - 0.75).abs() < f32::EPSILON);
    }
}
