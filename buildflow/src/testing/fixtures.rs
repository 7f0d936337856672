//! Contexts for calling components outside a task run.

use crate::cancellation::CancellationToken;
use crate::config::PipelineSettings;
use crate::context::{BranchContext, DestinationContext};
use crate::format::{FormatContext, FormatLayer};
use crate::report::StepResult;
use crate::services::ServiceContext;
use std::path::Path;
use std::sync::Arc;

/// Config name used by the fixture contexts.
pub const TEST_CONFIG_NAME: &str = "test-config";

/// A branch context for config `config_index` with default settings,
/// no registered services and a fresh step result.
#[must_use]
pub fn branch_context(config_index: usize) -> BranchContext {
    let guid = uuid::Uuid::new_v4().to_string();
    let format = FormatContext::process().child(
        FormatLayer::new()
            .with("configName", TEST_CONFIG_NAME)
            .with("configIndex", config_index.to_string())
            .with("guid", guid.clone()),
    );

    BranchContext {
        config_index,
        config_name: TEST_CONFIG_NAME.to_string(),
        guid,
        settings: Arc::new(PipelineSettings::default()),
        services: Arc::new(ServiceContext::new()),
        format,
        cancel: Arc::new(CancellationToken::new()),
        step: StepResult::new(format!("test[{config_index}]")).into_handle(),
    }
}

/// A destination context uploading from `cached_path` with an empty description.
#[must_use]
pub fn destination_context(cached_path: &Path) -> DestinationContext {
    DestinationContext {
        branch: branch_context(0),
        destination_index: 0,
        cached_path: cached_path.to_path_buf(),
        description: String::new(),
    }
}
