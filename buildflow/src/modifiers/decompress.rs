//! Extracts archives found in the cached build.

use super::Modifier;
use crate::context::{run_blocking, ModifyContext};
use crate::core::DuplicateFileHandling;
use crate::errors::BuildflowResult;
use crate::fsops::{extract_zip, is_archive, list_files, CopyOptions, FsError};
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted settings of [`DecompressModifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecompressSettings {
    /// Extract into a folder named after the archive instead of next to it.
    pub extract_to_folder: bool,
    /// Delete each archive after extracting it.
    pub delete_archives: bool,
    /// What to do with files that already exist.
    pub duplicate_file_handling: DuplicateFileHandling,
}

impl Default for DecompressSettings {
    fn default() -> Self {
        Self {
            extract_to_folder: false,
            delete_archives: true,
            duplicate_file_handling: DuplicateFileHandling::default(),
        }
    }
}

/// Extracts every `.zip` under the cached folder.
#[derive(Debug, Default)]
pub struct DecompressModifier {
    settings: DecompressSettings,
}

impl DecompressModifier {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "decompress";

    /// Creates a modifier from its settings.
    #[must_use]
    pub fn from_settings(settings: DecompressSettings) -> Self {
        Self { settings }
    }

    /// Restores a modifier from its persisted map.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self::from_settings(from_component_map(map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &DecompressSettings {
        &self.settings
    }
}

#[async_trait]
impl Modifier for DecompressModifier {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        "Decompress archives".to_string()
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    async fn modify_build_at_path(&self, cached_path: &Path, ctx: &ModifyContext) -> BuildflowResult<()> {
        let root = cached_path.to_path_buf();
        let settings = self.settings.clone();
        let cancel = ctx.cancel.clone();

        let extracted = run_blocking(move || {
            let archives: Vec<_> = list_files(&root)?.into_iter().filter(|path| is_archive(path)).collect();
            let options = CopyOptions::new(settings.duplicate_file_handling).with_cancel(&cancel);

            for archive in &archives {
                let parent = archive.parent().unwrap_or(&root);
                let target = match archive.file_stem() {
                    Some(stem) if settings.extract_to_folder => parent.join(stem),
                    _ => parent.to_path_buf(),
                };
                extract_zip(archive, &target, &options)?;
                if settings.delete_archives {
                    std::fs::remove_file(archive)
                        .map_err(|err| FsError::io("decompress.remove_archive", archive, err))?;
                }
            }
            Ok(archives.len())
        })
        .await?;

        if extracted == 0 {
            ctx.warn("No archives found to decompress");
        } else {
            ctx.log(format!("Decompressed {extracted} archives"));
        }
        Ok(())
    }
}
