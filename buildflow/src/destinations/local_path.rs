//! Copies (or zips) the cached build to a folder.

use super::Destination;
use crate::context::{run_blocking, DestinationContext};
use crate::core::{DuplicateFileHandling, RunState};
use crate::errors::BuildflowResult;
use crate::fsops::{copy_directory, zip_directory, CopyOptions};
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted settings of [`LocalPathDestination`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalPathDestinationSettings {
    /// Target folder. May contain `{key}` placeholders.
    pub path: String,
    /// Write a single zip instead of copying files.
    pub zip: bool,
    /// Archive name when `zip` is set. May contain `{key}` placeholders.
    pub zip_name: String,
    /// What to do with files that already exist.
    pub duplicate_file_handling: DuplicateFileHandling,
}

impl Default for LocalPathDestinationSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            zip: false,
            zip_name: "{configName}.zip".to_string(),
            duplicate_file_handling: DuplicateFileHandling::default(),
        }
    }
}

/// Delivers the build to a local or mounted folder.
#[derive(Debug, Default)]
pub struct LocalPathDestination {
    settings: LocalPathDestinationSettings,
    run_state: RunState,
}

impl LocalPathDestination {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "local_path";

    /// Creates a destination copying into `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, policy: DuplicateFileHandling) -> Self {
        Self::from_settings(LocalPathDestinationSettings {
            path: path.into(),
            duplicate_file_handling: policy,
            ..LocalPathDestinationSettings::default()
        })
    }

    /// Creates a destination from its settings.
    #[must_use]
    pub fn from_settings(settings: LocalPathDestinationSettings) -> Self {
        Self {
            settings,
            run_state: RunState::new(),
        }
    }

    /// Restores a destination from its persisted map.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self::from_settings(from_component_map(&migrate_legacy_keys(map))?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &LocalPathDestinationSettings {
        &self.settings
    }
}

/// Older documents stored a boolean `overwriteExistingFiles`.
fn migrate_legacy_keys(map: &ComponentMap) -> ComponentMap {
    let mut map = map.clone();
    if let Some(overwrite) = map.remove("overwriteExistingFiles") {
        if !map.contains_key("duplicateFileHandling") {
            let policy = if overwrite.as_bool().unwrap_or(false) {
                DuplicateFileHandling::Overwrite
            } else {
                DuplicateFileHandling::Error
            };
            map.insert(
                "duplicateFileHandling".to_string(),
                serde_json::Value::String(policy.to_string()),
            );
        }
    }
    map
}

#[async_trait]
impl Destination for LocalPathDestination {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Local path '{}'", self.settings.path)
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.settings.path.trim().is_empty() {
            issues.push("Local path destination has no path".to_string());
        }
        if self.settings.zip && self.settings.zip_name.trim().is_empty() {
            issues.push("Local path destination has no zip name".to_string());
        }
        issues
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        let target = PathBuf::from(ctx.format.format(&self.settings.path));
        let source = ctx.cached_path.clone();
        let policy = self.settings.duplicate_file_handling;
        let zip_name = self.settings.zip.then(|| ctx.format.format(&self.settings.zip_name));
        let progress = self.run_state.progress_handle().clone();
        let cancel = ctx.cancel.clone();

        self.run_state.begin(format!("Copying to {}", target.display()));
        let message = run_blocking(move || {
            let options = CopyOptions::new(policy).with_cancel(&cancel).with_progress(&progress);
            match zip_name {
                Some(name) => {
                    let archive = target.join(name);
                    let written = zip_directory(&source, &archive, &options)?;
                    Ok(format!("Zipped {written} files to '{}'", archive.display()))
                }
                None => {
                    let stats = copy_directory(&source, &target, &options)?;
                    Ok(format!(
                        "Copied {} files to '{}' ({} skipped)",
                        stats.written(),
                        target.display(),
                        stats.skipped
                    ))
                }
            }
        })
        .await;
        self.run_state.finish();

        ctx.log(message?);
        self.run_state.set_progress(1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::destination_context;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    fn map(value: serde_json::Value) -> ComponentMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_round_trip() {
        let destination = LocalPathDestination::from_settings(LocalPathDestinationSettings {
            path: "/out/{configName}".to_string(),
            zip: true,
            zip_name: "{date}.zip".to_string(),
            duplicate_file_handling: DuplicateFileHandling::Skip,
        });
        let restored = LocalPathDestination::from_map(&destination.to_map().unwrap()).unwrap();
        assert_eq!(restored.settings(), destination.settings());
    }

    #[test]
    fn test_missing_policy_defaults_to_error() {
        let destination = LocalPathDestination::from_map(&map(json!({"path": "/out"}))).unwrap();
        assert_eq!(destination.settings().duplicate_file_handling, DuplicateFileHandling::Error);
        assert!(!destination.settings().zip);
    }

    #[test]
    fn test_legacy_overwrite_flag() {
        let destination =
            LocalPathDestination::from_map(&map(json!({"path": "/out", "overwriteExistingFiles": true}))).unwrap();
        assert_eq!(destination.settings().duplicate_file_handling, DuplicateFileHandling::Overwrite);

        let explicit = LocalPathDestination::from_map(&map(json!({
            "path": "/out",
            "overwriteExistingFiles": true,
            "duplicateFileHandling": "Skip"
        })))
        .unwrap();
        assert_eq!(explicit.settings().duplicate_file_handling, DuplicateFileHandling::Skip);
    }

    #[tokio::test]
    async fn test_upload_copies_and_reports_conflict() {
        let dir = tempfile::TempDir::new().unwrap();
        let cached = dir.path().join("cached");
        fs::create_dir_all(&cached).unwrap();
        fs::write(cached.join("game.exe"), "new").unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("game.exe"), "old").unwrap();

        let destination = LocalPathDestination::new(out.to_string_lossy(), DuplicateFileHandling::Error);
        let ctx = destination_context(&cached);
        let err = destination.upload(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("game.exe"));
        assert_eq!(fs::read_to_string(out.join("game.exe")).unwrap(), "old");

        let destination = LocalPathDestination::new(out.to_string_lossy(), DuplicateFileHandling::Overwrite);
        destination.upload(&ctx).await.unwrap();
        assert_eq!(fs::read_to_string(out.join("game.exe")).unwrap(), "new");
        assert!((destination.upload_progress() - 1.0).abs() < f32::EPSILON);
    }
}
