//! Modifiers alter a cached build in place, or veto files while it is cached.

mod compress;
mod decompress;
mod exclude;

pub use compress::{CompressModifier, CompressSettings};
pub use decompress::{DecompressModifier, DecompressSettings};
pub use exclude::{ExcludeFilesModifier, ExcludeFilesSettings, ExcludeMode};

use crate::context::ModifyContext;
use crate::errors::BuildflowResult;
use crate::registry::ComponentMap;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// Alters a cached build.
#[async_trait]
pub trait Modifier: Send + Sync + Debug {
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

    /// Returns true to leave `relative_path` out of the cache.
    ///
    /// `relative_path` is relative to the cached folder, so it starts with the
    /// source entry's subfolder when one is set.
    fn ignore_file_during_cache(&self, _relative_path: &Path, _config_index: usize) -> bool {
        false
    }

    /// Modifies the cached build at `cached_path`.
    async fn modify_build_at_path(&self, cached_path: &Path, ctx: &ModifyContext) -> BuildflowResult<()>;
}
