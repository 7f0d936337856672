//! Removes files matching regular expressions.

use super::Modifier;
use crate::context::{run_blocking, ModifyContext};
use crate::errors::BuildflowResult;
use crate::fsops::{list_files, relative_slash_path, FsError};
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// When matching files are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExcludeMode {
    /// Delete matching files from the cached folder after caching.
    #[default]
    DeleteFromCache,
    /// Never copy matching files into the cache.
    IgnoreDuringCache,
}

/// Persisted settings of [`ExcludeFilesModifier`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExcludeFilesSettings {
    /// Patterns matched against `/`-separated paths relative to the build root.
    pub patterns: Vec<String>,
    /// When the exclusion happens.
    pub mode: ExcludeMode,
}

/// Excludes files whose relative path matches any pattern.
#[derive(Debug, Default)]
pub struct ExcludeFilesModifier {
    settings: ExcludeFilesSettings,
    compiled: Vec<Regex>,
}

impl ExcludeFilesModifier {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "exclude_files";

    /// Creates a modifier for `patterns`.
    #[must_use]
    pub fn new<I, S>(patterns: I, mode: ExcludeMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_settings(ExcludeFilesSettings {
            patterns: patterns.into_iter().map(Into::into).collect(),
            mode,
        })
    }

    /// Creates a modifier from its settings. Invalid patterns are reported by `validate`.
    #[must_use]
    pub fn from_settings(settings: ExcludeFilesSettings) -> Self {
        let compiled = settings
            .patterns
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        Self { settings, compiled }
    }

    /// Restores a modifier from its persisted map.
    ///
    /// Older documents stored a single pattern under `regex`.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        let mut map = map.clone();
        if !map.contains_key("patterns") {
            if let Some(serde_json::Value::String(pattern)) = map.remove("regex") {
                map.insert("patterns".to_string(), serde_json::json!([pattern]));
            }
        }
        Ok(Self::from_settings(from_component_map(&map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &ExcludeFilesSettings {
        &self.settings
    }

    /// Returns true if the `/`-separated relative path matches a pattern.
    #[must_use]
    pub fn is_match(&self, relative: &str) -> bool {
        self.compiled.iter().any(|regex| regex.is_match(relative))
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl Modifier for ExcludeFilesModifier {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Exclude files ({})", self.settings.patterns.join(", "))
    }

    fn validate(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .settings
            .patterns
            .iter()
            .filter_map(|pattern| {
                Regex::new(pattern)
                    .err()
                    .map(|err| format!("Invalid exclude pattern '{pattern}': {err}"))
            })
            .collect();
        if self.settings.patterns.is_empty() {
            issues.push("Exclude files modifier has no patterns".to_string());
        }
        issues
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn ignore_file_during_cache(&self, relative_path: &Path, _config_index: usize) -> bool {
        self.settings.mode == ExcludeMode::IgnoreDuringCache && self.is_match(&slash_path(relative_path))
    }

    async fn modify_build_at_path(&self, cached_path: &Path, ctx: &ModifyContext) -> BuildflowResult<()> {
        if self.settings.mode == ExcludeMode::IgnoreDuringCache {
            ctx.log("Matching files were excluded while caching");
            return Ok(());
        }

        let root = cached_path.to_path_buf();
        let compiled = self.compiled.clone();
        let cancel = ctx.cancel.clone();
        let matches = run_blocking(move || {
            let files = list_files(&root)?;
            Ok(files
                .into_iter()
                .filter(|path| {
                    let relative = relative_slash_path(&root, path);
                    compiled.iter().any(|regex| regex.is_match(&relative))
                })
                .collect::<Vec<_>>())
        })
        .await?;

        ctx.log(format!("Removing {} files", matches.len()));
        run_blocking(move || {
            for path in &matches {
                cancel.check()?;
                std::fs::remove_file(path).map_err(|err| FsError::io("exclude.remove_file", path, err))?;
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::branch_context;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_round_trip() {
        let modifier = ExcludeFilesModifier::new([r"\.pdb$", "^Logs/"], ExcludeMode::IgnoreDuringCache);
        let restored = ExcludeFilesModifier::from_map(&modifier.to_map().unwrap()).unwrap();
        assert_eq!(restored.settings(), modifier.settings());
    }

    #[test]
    fn test_missing_mode_defaults_to_delete() {
        let map = match serde_json::json!({"regex": r"\.pdb$"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let modifier = ExcludeFilesModifier::from_map(&map).unwrap();
        assert_eq!(modifier.settings().mode, ExcludeMode::DeleteFromCache);
        assert_eq!(modifier.settings().patterns, vec![r"\.pdb$".to_string()]);
    }

    #[test]
    fn test_validate_reports_invalid_pattern() {
        let modifier = ExcludeFilesModifier::new(["(unclosed"], ExcludeMode::DeleteFromCache);
        let issues = modifier.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("(unclosed"));
    }

    #[test]
    fn test_ignore_only_in_ignore_mode() {
        let ignore = ExcludeFilesModifier::new([r"^Symbols/"], ExcludeMode::IgnoreDuringCache);
        let delete = ExcludeFilesModifier::new([r"^Symbols/"], ExcludeMode::DeleteFromCache);
        let path = Path::new("Symbols").join("game.pdb");

        assert!(ignore.ignore_file_during_cache(&path, 0));
        assert!(!ignore.ignore_file_during_cache(Path::new("game.exe"), 0));
        assert!(!delete.ignore_file_during_cache(&path, 0));
    }

    #[tokio::test]
    async fn test_delete_from_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("game.exe"), "x").unwrap();
        fs::write(dir.path().join("game.pdb"), "x").unwrap();
        fs::write(dir.path().join("sub/plugin.pdb"), "x").unwrap();

        let modifier = ExcludeFilesModifier::new([r"\.pdb$"], ExcludeMode::DeleteFromCache);
        let ctx = branch_context(0);
        modifier.modify_build_at_path(dir.path(), &ctx).await.unwrap();

        let remaining: Vec<String> = list_files(dir.path())
            .unwrap()
            .iter()
            .map(|path| relative_slash_path(dir.path(), path))
            .collect();
        assert_eq!(remaining, vec!["game.exe".to_string()]);
        assert!(ctx.step.lock().contains_log("Removing 2 files"));
    }
}
