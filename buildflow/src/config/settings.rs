//! Pipeline-wide settings.

use crate::core::DuplicateFileHandling;
use crate::errors::BuildflowResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable overriding [`PipelineSettings::cache_root`].
pub const ENV_CACHE_ROOT: &str = "BUILDFLOW_CACHE_ROOT";
/// Environment variable overriding [`PipelineSettings::download_root`].
pub const ENV_DOWNLOAD_ROOT: &str = "BUILDFLOW_DOWNLOAD_ROOT";
/// Environment variable overriding [`PipelineSettings::poll_interval_ms`].
pub const ENV_POLL_INTERVAL_MS: &str = "BUILDFLOW_POLL_INTERVAL_MS";

/// Settings shared by every config of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Root of the per-config cache folders.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// Where remote sources download their artifacts.
    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,
    /// Interval between progress samples, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extract `.zip` sources while caching instead of copying the archive.
    #[serde(default = "default_true")]
    pub auto_decompress_archives: bool,
    /// What caching does when two source entries write the same file.
    #[serde(default)]
    pub cache_duplicate_file_handling: DuplicateFileHandling,
    /// Delete the cache folders after a fully successful run.
    #[serde(default = "default_true")]
    pub delete_cache_after_upload: bool,
    /// Template for the build description handed to destinations.
    #[serde(default = "default_build_description")]
    pub build_description: String,
}

fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join("buildflow").join("cache")
}

fn default_download_root() -> PathBuf {
    std::env::temp_dir().join("buildflow").join("downloads")
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_build_description() -> String {
    "{configName} ({date})".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            download_root: default_download_root(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_decompress_archives: default_true(),
            cache_duplicate_file_handling: DuplicateFileHandling::default(),
            delete_cache_after_upload: default_true(),
            build_description: default_build_description(),
        }
    }
}

impl PipelineSettings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from an optional JSON file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> BuildflowResult<Self> {
        let settings = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading pipeline settings");
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => Self::default(),
        };
        Ok(settings.with_env_overrides())
    }

    /// Applies `BUILDFLOW_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ENV_CACHE_ROOT).filter(|value| !value.is_empty()) {
            self.cache_root = PathBuf::from(root);
        }
        if let Some(root) = lookup(ENV_DOWNLOAD_ROOT).filter(|value| !value.is_empty()) {
            self.download_root = PathBuf::from(root);
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            match value.parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => warn!(value = %value, "Ignoring invalid {}", ENV_POLL_INTERVAL_MS),
            }
        }
        self
    }

    /// Sets the cache root.
    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Sets the download root.
    #[must_use]
    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = root.into();
        self
    }

    /// Sets the progress sampling interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms.max(1);
        self
    }

    /// Sets whether cache folders are deleted after a successful run.
    #[must_use]
    pub fn with_delete_cache_after_upload(mut self, delete: bool) -> Self {
        self.delete_cache_after_upload = delete;
        self
    }

    /// Sets whether archive sources are extracted while caching.
    #[must_use]
    pub fn with_auto_decompress(mut self, enabled: bool) -> Self {
        self.auto_decompress_archives = enabled;
        self
    }

    /// Sets the duplicate-file policy used while caching.
    #[must_use]
    pub fn with_cache_duplicate_file_handling(mut self, policy: DuplicateFileHandling) -> Self {
        self.cache_duplicate_file_handling = policy;
        self
    }

    /// Sets the build description template.
    #[must_use]
    pub fn with_build_description(mut self, template: impl Into<String>) -> Self {
        self.build_description = template.into();
        self
    }

    /// The progress sampling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The cache folder of a config.
    #[must_use]
    pub fn cache_folder(&self, guid: &str) -> PathBuf {
        self.cache_root.join(guid)
    }

    /// Where destinations write generated release manifests.
    #[must_use]
    pub fn manifest_folder(&self) -> PathBuf {
        self.download_root.join("manifests")
    }
}
