//! Sources fetch one build artifact to a local path.

mod cloud_build;
mod local_path;

pub use cloud_build::{CloudBuildSource, CloudBuildSourceSettings};
pub use local_path::{LocalPathSource, LocalPathSourceSettings};

use crate::context::SourceContext;
use crate::core::RunState;
use crate::errors::BuildflowResult;
use crate::format::FormatContext;
use crate::registry::ComponentMap;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;

/// Fetches a build artifact to a local path.
#[async_trait]
pub trait Source: Send + Sync + Debug {
    /// Stable type key used for persistence.
    fn type_key(&self) -> &'static str;

    /// Human-readable name for logs and failure messages.
    fn display_name(&self) -> String;

    /// Configuration issues, checked before a run.
    fn validate(&self, _format: &FormatContext) -> Vec<String> {
        Vec::new()
    }

    /// The persisted settings.
    fn to_map(&self) -> BuildflowResult<ComponentMap>;

    /// Transient run state.
    fn run_state(&self) -> &RunState;

    /// Fetches the artifact. On success [`source_file_path`](Self::source_file_path) is set.
    async fn fetch(&self, ctx: &SourceContext) -> BuildflowResult<()>;

    /// Download progress in `[0, 1]`.
    fn download_progress(&self) -> f32 {
        self.run_state().progress()
    }

    /// Local path of the fetched artifact. Only valid after a successful fetch.
    fn source_file_path(&self) -> Option<PathBuf>;
}
