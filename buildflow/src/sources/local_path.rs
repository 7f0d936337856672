//! A build that already exists on disk.

use super::Source;
use crate::context::SourceContext;
use crate::core::RunState;
use crate::errors::{BuildflowError, BuildflowResult};
use crate::format::FormatContext;
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted settings of [`LocalPathSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalPathSourceSettings {
    /// Path to a folder, an executable or an archive. May contain `{key}` placeholders.
    pub path: String,
}

/// Uses a folder or file from the local filesystem.
#[derive(Debug, Default)]
pub struct LocalPathSource {
    settings: LocalPathSourceSettings,
    run_state: RunState,
    resolved: RwLock<Option<PathBuf>>,
}

impl LocalPathSource {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "local_path";

    /// Creates a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self::from_settings(LocalPathSourceSettings { path: path.into() })
    }

    /// Creates a source from its settings.
    #[must_use]
    pub fn from_settings(settings: LocalPathSourceSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Restores a source from its persisted map.
    ///
    /// Older documents stored the path under `sourcePath`.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        let mut map = map.clone();
        if !map.contains_key("path") {
            if let Some(legacy) = map.remove("sourcePath") {
                map.insert("path".to_string(), legacy);
            }
        }
        Ok(Self::from_settings(from_component_map(&map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &LocalPathSourceSettings {
        &self.settings
    }
}

#[async_trait]
impl Source for LocalPathSource {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Local path '{}'", self.settings.path)
    }

    fn validate(&self, _format: &FormatContext) -> Vec<String> {
        if self.settings.path.trim().is_empty() {
            vec!["Local path source has no path".to_string()]
        } else {
            Vec::new()
        }
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn fetch(&self, ctx: &SourceContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        let path = PathBuf::from(ctx.format.format(&self.settings.path));
        self.run_state.begin(format!("Checking {}", path.display()));

        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        self.run_state.finish();
        if !exists {
            return Err(BuildflowError::source(format!(
                "Source path '{}' does not exist",
                path.display()
            )));
        }

        ctx.log(format!("Using local build at '{}'", path.display()));
        *self.resolved.write() = Some(path);
        self.run_state.set_progress(1.0);
        Ok(())
    }

    fn source_file_path(&self) -> Option<PathBuf> {
        self.resolved.read().clone()
    }
}
