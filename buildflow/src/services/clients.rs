//! Narrow interfaces to third-party services.

use crate::errors::BuildflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A build artifact published by a cloud build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudBuildArtifact {
    /// Build number reported by the service.
    pub build_number: u64,
    /// Direct download URL.
    pub download_url: String,
    /// File name to store the download under.
    pub file_name: String,
}

/// Client for a cloud build service (one project per client).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudBuildClient: Send + Sync {
    /// Lists the build targets of the project.
    async fn list_build_targets(&self) -> Result<Vec<String>, BuildflowError>;

    /// Returns the latest successful artifact of a build target.
    async fn latest_artifact(&self, build_target: &str) -> Result<CloudBuildArtifact, BuildflowError>;
}

/// A release to publish to an artifact/release store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRequest {
    /// Channel, branch or track to publish to.
    pub channel: String,
    /// Version label.
    pub version: String,
    /// Build description shown to users.
    pub description: String,
    /// Root folder the files are relative to.
    pub root: PathBuf,
    /// Files to publish.
    pub files: Vec<PathBuf>,
    /// Manifest generated during prepare.
    pub manifest: PathBuf,
}

/// What the store returned after publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    /// Store-side identifier.
    pub id: String,
    /// Public URL, when the store exposes one.
    pub url: Option<String>,
}

/// Client for an artifact/release store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Lists the channels the store accepts.
    async fn list_channels(&self) -> Result<Vec<String>, BuildflowError>;

    /// Publishes a release.
    async fn publish(&self, request: &ReleaseRequest) -> Result<ReleaseReceipt, BuildflowError>;
}
