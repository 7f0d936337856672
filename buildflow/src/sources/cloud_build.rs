//! A build downloaded from a cloud build service.

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
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Persisted settings of [`CloudBuildSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudBuildSourceSettings {
    /// Name of the cloud build client in the service context.
    pub service: String,
    /// Build target to download the latest artifact of.
    pub build_target: String,
}

/// Downloads the latest artifact of a build target.
#[derive(Debug, Default)]
pub struct CloudBuildSource {
    settings: CloudBuildSourceSettings,
    run_state: RunState,
    downloaded: RwLock<Option<PathBuf>>,
}

impl CloudBuildSource {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "cloud_build";

    /// Creates a source for a build target of a registered service.
    #[must_use]
    pub fn new(service: impl Into<String>, build_target: impl Into<String>) -> Self {
        Self::from_settings(CloudBuildSourceSettings {
            service: service.into(),
            build_target: build_target.into(),
        })
    }

    /// Creates a source from its settings.
    #[must_use]
    pub fn from_settings(settings: CloudBuildSourceSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Restores a source from its persisted map.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self::from_settings(from_component_map(map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &CloudBuildSourceSettings {
        &self.settings
    }
}

#[async_trait]
impl Source for CloudBuildSource {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Cloud build '{}/{}'", self.settings.service, self.settings.build_target)
    }

    fn validate(&self, _format: &FormatContext) -> Vec<String> {
        let mut issues = Vec::new();
        if self.settings.service.is_empty() {
            issues.push("Cloud build source has no service".to_string());
        }
        if self.settings.build_target.is_empty() {
            issues.push("Cloud build source has no build target".to_string());
        }
        issues
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn fetch(&self, ctx: &SourceContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        let client = ctx.services.cloud_build(&self.settings.service)?;

        self.run_state.begin(format!("Looking up {}", self.settings.build_target));
        let artifact = client.latest_artifact(&self.settings.build_target).await?;
        ctx.log(format!(
            "Downloading build #{} of '{}'",
            artifact.build_number, self.settings.build_target
        ));

        let folder = ctx.settings.download_root.join(&ctx.guid);
        tokio::fs::create_dir_all(&folder).await?;
        let path = folder.join(&artifact.file_name);

        let mut response = ctx
            .services
            .http()
            .get(&artifact.download_url)
            .send()
            .await?
            .error_for_status()?;
        let total = response.content_length();
        let mut file = tokio::fs::File::create(&path).await?;
        let mut received: u64 = 0;

        self.run_state.set_description(format!("Downloading {}", artifact.file_name));
        loop {
            let next = tokio::select! {
                next = response.chunk() => next?,
                () = ctx.cancel.cancelled() => None,
            };
            ctx.check_cancelled()?;
            let Some(chunk) = next else { break };
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let Some(total) = total.filter(|total| *total > 0) {
                #[allow(clippy::cast_precision_loss)]
                self.run_state.set_progress(received as f32 / total as f32);
            }
        }
        file.flush().await?;
        self.run_state.finish();

        if received == 0 {
            return Err(BuildflowError::source(format!(
                "Download of '{}' was empty",
                artifact.download_url
            )));
        }

        debug!(path = %path.display(), bytes = received, "Download finished");
        ctx.log(format!("Downloaded {received} bytes to '{}'", path.display()));
        *self.downloaded.write() = Some(path);
        self.run_state.set_progress(1.0);
        Ok(())
    }

    fn source_file_path(&self) -> Option<PathBuf> {
        self.downloaded.read().clone()
    }
}
