//! Replaces the cached build with a single zip archive.

use super::Modifier;
use crate::context::{run_blocking, ModifyContext};
use crate::core::DuplicateFileHandling;
use crate::errors::BuildflowResult;
use crate::fsops::{remove_dir_contents, zip_directory, CopyOptions, FsError};
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted settings of [`CompressModifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressSettings {
    /// Archive file name. May contain `{key}` placeholders.
    pub archive_name: String,
}

impl Default for CompressSettings {
    fn default() -> Self {
        Self {
            archive_name: "{configName}.zip".to_string(),
        }
    }
}

/// Zips the cached folder and keeps only the archive.
#[derive(Debug, Default)]
pub struct CompressModifier {
    settings: CompressSettings,
}

impl CompressModifier {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "compress";

    /// Creates a modifier writing `archive_name`.
    #[must_use]
    pub fn new(archive_name: impl Into<String>) -> Self {
        Self {
            settings: CompressSettings {
                archive_name: archive_name.into(),
            },
        }
    }

    /// Restores a modifier from its persisted map.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self {
            settings: from_component_map(map)?,
        })
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &CompressSettings {
        &self.settings
    }
}

#[async_trait]
impl Modifier for CompressModifier {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Compress to '{}'", self.settings.archive_name)
    }

    fn validate(&self) -> Vec<String> {
        if self.settings.archive_name.trim().is_empty() {
            vec!["Compress modifier has no archive name".to_string()]
        } else {
            Vec::new()
        }
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    async fn modify_build_at_path(&self, cached_path: &Path, ctx: &ModifyContext) -> BuildflowResult<()> {
        let archive_name = ctx.format.format(&self.settings.archive_name);
        let root = cached_path.to_path_buf();
        let staging = root.with_extension("zip.partial");
        let cancel = ctx.cancel.clone();

        let written = run_blocking(move || {
            let options = CopyOptions::new(DuplicateFileHandling::Overwrite).with_cancel(&cancel);
            let written = zip_directory(&root, &staging, &options)?;
            remove_dir_contents(&root)?;
            let target = root.join(&archive_name);
            std::fs::rename(&staging, &target)
                .map_err(|err| FsError::io("compress.rename", &target, err))?;
            Ok(written)
        })
        .await?;

        ctx.log(format!("Compressed {written} files"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::{extract_zip, list_files};
    use crate::testing::branch_context;
    use std::fs;

    #[test]
    fn test_round_trip() {
        let modifier = CompressModifier::new("{configName}-{date}.zip");
        let restored = CompressModifier::from_map(&modifier.to_map().unwrap()).unwrap();
        assert_eq!(restored.settings(), modifier.settings());
    }

    #[test]
    fn test_missing_name_defaults() {
        let modifier = CompressModifier::from_map(&ComponentMap::new()).unwrap();
        assert_eq!(modifier.settings().archive_name, "{configName}.zip");
    }

    #[tokio::test]
    async fn test_compress_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let cached = dir.path().join("guid");
        fs::create_dir_all(cached.join("data")).unwrap();
        fs::write(cached.join("game.exe"), "exe").unwrap();
        fs::write(cached.join("data/level.bin"), "lvl").unwrap();

        let modifier = CompressModifier::new("build.zip");
        let ctx = branch_context(0);
        modifier.modify_build_at_path(&cached, &ctx).await.unwrap();

        let files = list_files(&cached).unwrap();
        assert_eq!(files, vec![cached.join("build.zip")]);
        assert!(ctx.step.lock().contains_log("Compressed 2 files"));

        let out = dir.path().join("out");
        extract_zip(&cached.join("build.zip"), &out, &CopyOptions::new(DuplicateFileHandling::Error)).unwrap();
        assert_eq!(fs::read_to_string(out.join("data/level.bin")).unwrap(), "lvl");
    }
}
