//! Destinations deliver a cached build somewhere.

mod local_path;
mod noop;
mod release_store;
mod webhook;

pub use local_path::{LocalPathDestination, LocalPathDestinationSettings};
pub use noop::NoOpDestination;
pub use release_store::{ManifestFile, ReleaseManifest, ReleaseStoreDestination, ReleaseStoreSettings};
pub use webhook::{WebhookDestination, WebhookSettings};

use crate::context::DestinationContext;
use crate::core::RunState;
use crate::errors::BuildflowResult;
use crate::registry::ComponentMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Outcome of one destination's prepare and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Whether the destination succeeded.
    pub successful: bool,
    /// Why it failed; empty on success.
    pub fail_reason: String,
}

impl UploadResult {
    /// A successful result.
    #[must_use]
    pub fn success() -> Self {
        Self {
            successful: true,
            fail_reason: String::new(),
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            fail_reason: reason.into(),
        }
    }
}

/// Prepares, uploads and cleans up one delivery target.
///
/// `clean_up` is always called after `upload`, even when `prepare` failed,
/// and must be safe to call more than once.
#[async_trait]
pub trait Destination: Send + Sync + Debug {
    /// Stable type key used for persistence.
    fn type_key(&self) -> &'static str;

    /// Human-readable name for logs and failure messages.
    fn display_name(&self) -> String;

    /// Configuration issues, checked before a run.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    /// The persisted settings.
    fn to_map(&self) -> BuildflowResult<ComponentMap>;

    /// Transient run state.
    fn run_state(&self) -> &RunState;

    /// Destination-specific setup, such as generating manifests.
    async fn prepare(&self, _ctx: &DestinationContext) -> BuildflowResult<()> {
        Ok(())
    }

    /// Uploads the cached build.
    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()>;

    /// Upload progress in `[0, 1]`.
    fn upload_progress(&self) -> f32 {
        self.run_state().progress()
    }

    /// Releases temporary resources.
    async fn clean_up(&self) {}
}
