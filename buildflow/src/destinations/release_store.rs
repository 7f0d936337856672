//! Publishes the build to an artifact/release store.

use super::Destination;
use crate::context::{run_blocking, DestinationContext};
use crate::core::RunState;
use crate::errors::{BuildflowError, BuildflowResult};
use crate::fsops::{list_files, relative_slash_path, FsError};
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use crate::services::ReleaseRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted settings of [`ReleaseStoreDestination`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseStoreSettings {
    /// Name of the release client in the service context.
    pub service: String,
    /// Channel to publish to. May contain `{key}` placeholders.
    pub channel: String,
    /// Version label. May contain `{key}` placeholders.
    pub version: String,
}

impl Default for ReleaseStoreSettings {
    fn default() -> Self {
        Self {
            service: String::new(),
            channel: String::new(),
            version: "{date}-{time}".to_string(),
        }
    }
}

/// One file listed in a release manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the build root, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded SHA-256 of the contents.
    pub sha256: String,
}

/// Release manifest written during `prepare`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseManifest {
    /// Config the build came from.
    pub config_name: String,
    /// Config GUID.
    pub guid: String,
    /// Target channel.
    pub channel: String,
    /// Version label.
    pub version: String,
    /// Build description.
    pub description: String,
    /// When the manifest was generated.
    pub created_at: DateTime<Utc>,
    /// Every file of the build.
    pub files: Vec<ManifestFile>,
}

#[derive(Debug)]
struct Prepared {
    manifest_path: PathBuf,
    manifest: ReleaseManifest,
}

/// Publishes the cached build through a [`ReleaseClient`](crate::services::ReleaseClient).
#[derive(Debug, Default)]
pub struct ReleaseStoreDestination {
    settings: ReleaseStoreSettings,
    run_state: RunState,
    prepared: Mutex<Option<Prepared>>,
}

impl ReleaseStoreDestination {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "release_store";

    /// Creates a destination publishing to `channel` of `service`.
    #[must_use]
    pub fn new(service: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::from_settings(ReleaseStoreSettings {
            service: service.into(),
            channel: channel.into(),
            ..ReleaseStoreSettings::default()
        })
    }

    /// Creates a destination from its settings.
    #[must_use]
    pub fn from_settings(settings: ReleaseStoreSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Restores a destination from its persisted map.
    ///
    /// Older documents called the channel `branch`.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        let mut map = map.clone();
        if !map.contains_key("channel") {
            if let Some(branch) = map.remove("branch") {
                map.insert("channel".to_string(), branch);
            }
        }
        Ok(Self::from_settings(from_component_map(&map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &ReleaseStoreSettings {
        &self.settings
    }

    /// Path of the manifest written by `prepare`, until `clean_up` removes it.
    #[must_use]
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.prepared.lock().as_ref().map(|prepared| prepared.manifest_path.clone())
    }
}

fn hash_file(path: &Path) -> Result<(u64, String), FsError> {
    let mut file = File::open(path).map_err(|err| FsError::io("manifest.open", path, err))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).map_err(|err| FsError::io("manifest.hash", path, err))?;
    Ok((size, hex::encode(hasher.finalize())))
}

fn build_manifest_files(root: &Path) -> Result<Vec<ManifestFile>, FsError> {
    list_files(root)?
        .iter()
        .map(|path| {
            let (size, sha256) = hash_file(path)?;
            Ok(ManifestFile {
                path: relative_slash_path(root, path),
                size,
                sha256,
            })
        })
        .collect()
}

#[async_trait]
impl Destination for ReleaseStoreDestination {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("Release store '{}' ({})", self.settings.service, self.settings.channel)
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.settings.service.is_empty() {
            issues.push("Release store destination has no service".to_string());
        }
        if self.settings.channel.is_empty() {
            issues.push("Release store destination has no channel".to_string());
        }
        issues
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn prepare(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        self.run_state.begin("Generating release manifest");

        let root = ctx.cached_path.clone();
        let files = run_blocking(move || Ok(build_manifest_files(&root)?)).await?;
        let manifest = ReleaseManifest {
            config_name: ctx.config_name.clone(),
            guid: ctx.guid.clone(),
            channel: ctx.format.format(&self.settings.channel),
            version: ctx.format.format(&self.settings.version),
            description: ctx.description.clone(),
            created_at: Utc::now(),
            files,
        };

        let folder = ctx.settings.manifest_folder();
        tokio::fs::create_dir_all(&folder).await?;
        let manifest_path = folder.join(format!(
            "{}-{}-{}.json",
            ctx.guid,
            ctx.destination_index,
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?).await?;

        ctx.log(format!(
            "Wrote manifest for {} files to '{}'",
            manifest.files.len(),
            manifest_path.display()
        ));
        *self.prepared.lock() = Some(Prepared {
            manifest_path,
            manifest,
        });
        Ok(())
    }

    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        let request = {
            let prepared = self.prepared.lock();
            let prepared = prepared
                .as_ref()
                .ok_or_else(|| BuildflowError::destination("Release manifest was not prepared"))?;
            ReleaseRequest {
                channel: prepared.manifest.channel.clone(),
                version: prepared.manifest.version.clone(),
                description: prepared.manifest.description.clone(),
                root: ctx.cached_path.clone(),
                files: prepared
                    .manifest
                    .files
                    .iter()
                    .map(|file| ctx.cached_path.join(&file.path))
                    .collect(),
                manifest: prepared.manifest_path.clone(),
            }
        };

        let client = ctx.services.release_store(&self.settings.service)?;
        self.run_state.set_description(format!("Publishing to {}", request.channel));
        let receipt = client.publish(&request).await?;
        self.run_state.finish();
        self.run_state.set_progress(1.0);

        match receipt.url {
            Some(url) => ctx.log(format!("Published release {} to {url}", receipt.id)),
            None => ctx.log(format!("Published release {}", receipt.id)),
        }
        Ok(())
    }

    async fn clean_up(&self) {
        let prepared = self.prepared.lock().take();
        if let Some(prepared) = prepared {
            match tokio::fs::remove_file(&prepared.manifest_path).await {
                Ok(()) => debug!(path = %prepared.manifest_path.display(), "Removed release manifest"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %prepared.manifest_path.display(),
                    error = %err,
                    "Failed to remove release manifest"
                ),
            }
        }
        self.run_state.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::services::{MockReleaseClient, ReleaseReceipt};
    use crate::testing::destination_context;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn test_round_trip() {
        let destination = ReleaseStoreDestination::from_settings(ReleaseStoreSettings {
            service: "store".to_string(),
            channel: "beta-{configName}".to_string(),
            version: "1.0.{date}".to_string(),
        });
        let restored = ReleaseStoreDestination::from_map(&destination.to_map().unwrap()).unwrap();
        assert_eq!(restored.settings(), destination.settings());
    }

    #[test]
    fn test_legacy_branch_key() {
        let map = match serde_json::json!({"service": "store", "branch": "beta"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let destination = ReleaseStoreDestination::from_map(&map).unwrap();
        assert_eq!(destination.settings().channel, "beta");
        assert_eq!(destination.settings().version, "{date}-{time}");
    }

    #[tokio::test]
    async fn test_prepare_upload_clean_up() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("game.exe"), "abc").unwrap();
        fs::write(dir.path().join("data/level.bin"), "level").unwrap();

        let mut client = MockReleaseClient::new();
        client
            .expect_publish()
            .withf(|request| request.files.len() == 2 && request.manifest.exists() && request.channel == "beta")
            .times(1)
            .returning(|_| {
                Ok(ReleaseReceipt {
                    id: "r-1".to_string(),
                    url: None,
                })
            });

        let downloads = tempfile::TempDir::new().unwrap();
        let mut ctx = destination_context(dir.path());
        ctx.branch.settings = Arc::new(PipelineSettings::default().with_download_root(downloads.path()));
        ctx.services.register_release_store("store", Arc::new(client));

        let destination = ReleaseStoreDestination::new("store", "beta");
        destination.prepare(&ctx).await.unwrap();

        let manifest_path = destination.manifest_path().unwrap();
        assert!(manifest_path.starts_with(downloads.path().join("manifests")));
        let manifest: ReleaseManifest = serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        let exe = manifest.files.iter().find(|file| file.path == "game.exe").unwrap();
        assert_eq!(exe.size, 3);
        assert_eq!(
            exe.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        destination.upload(&ctx).await.unwrap();
        assert!(ctx.step.lock().contains_log("Published release r-1"));

        destination.clean_up().await;
        assert!(!manifest_path.exists());
        destination.clean_up().await;
    }

    #[tokio::test]
    async fn test_upload_without_prepare_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = ReleaseStoreDestination::new("store", "beta");
        let err = destination.upload(&destination_context(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("not prepared"));
    }
}
