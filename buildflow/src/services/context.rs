//! Explicit, injectable service context.

use super::{CloudBuildClient, ReleaseClient};
use crate::errors::BuildflowError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Remote metadata cached by [`ServiceContext::refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// Build targets per cloud build client name.
    pub build_targets: HashMap<String, Vec<String>>,
    /// Channels per release store name.
    pub release_channels: HashMap<String, Vec<String>>,
    /// When the cache was last refreshed.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Holds named clients and their cached metadata for one process or test.
pub struct ServiceContext {
    http: reqwest::Client,
    cloud_build: RwLock<HashMap<String, Arc<dyn CloudBuildClient>>>,
    release_stores: RwLock<HashMap<String, Arc<dyn ReleaseClient>>>,
    metadata: RwLock<ServiceMetadata>,
}

impl ServiceContext {
    /// Creates a context with a default HTTP client and no services.
    #[must_use]
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    /// Creates a context around an existing HTTP client.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            cloud_build: RwLock::new(HashMap::new()),
            release_stores: RwLock::new(HashMap::new()),
            metadata: RwLock::new(ServiceMetadata::default()),
        }
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Registers a cloud build client under `name`.
    pub fn register_cloud_build(&self, name: impl Into<String>, client: Arc<dyn CloudBuildClient>) {
        self.cloud_build.write().insert(name.into(), client);
    }

    /// Registers a release store client under `name`.
    pub fn register_release_store(&self, name: impl Into<String>, client: Arc<dyn ReleaseClient>) {
        self.release_stores.write().insert(name.into(), client);
    }

    /// Returns the cloud build client registered as `name`.
    pub fn cloud_build(&self, name: &str) -> Result<Arc<dyn CloudBuildClient>, BuildflowError> {
        self.cloud_build
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BuildflowError::MissingService(name.to_string()))
    }

    /// Returns the release store client registered as `name`.
    pub fn release_store(&self, name: &str) -> Result<Arc<dyn ReleaseClient>, BuildflowError> {
        self.release_stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BuildflowError::MissingService(name.to_string()))
    }

    /// Re-fetches build targets and release channels from every registered client.
    ///
    /// A client that fails keeps its previous cache entry; the first error is returned
    /// after every client has been tried.
    pub async fn refresh(&self) -> Result<(), BuildflowError> {
        let cloud_clients: Vec<_> = self
            .cloud_build
            .read()
            .iter()
            .map(|(name, client)| (name.clone(), client.clone()))
            .collect();
        let release_clients: Vec<_> = self
            .release_stores
            .read()
            .iter()
            .map(|(name, client)| (name.clone(), client.clone()))
            .collect();

        let mut first_error = None;

        for (name, client) in cloud_clients {
            match client.list_build_targets().await {
                Ok(targets) => {
                    debug!(service = %name, count = targets.len(), "Refreshed build targets");
                    self.metadata.write().build_targets.insert(name, targets);
                }
                Err(err) => {
                    warn!(service = %name, error = %err, "Failed to refresh build targets");
                    first_error.get_or_insert(err);
                }
            }
        }

        for (name, client) in release_clients {
            match client.list_channels().await {
                Ok(channels) => {
                    debug!(service = %name, count = channels.len(), "Refreshed release channels");
                    self.metadata.write().release_channels.insert(name, channels);
                }
                Err(err) => {
                    warn!(service = %name, error = %err, "Failed to refresh release channels");
                    first_error.get_or_insert(err);
                }
            }
        }

        self.metadata.write().refreshed_at = Some(Utc::now());
        first_error.map_or(Ok(()), Err)
    }

    /// Drops all cached metadata.
    pub fn invalidate(&self) {
        *self.metadata.write() = ServiceMetadata::default();
    }

    /// A copy of the cached metadata.
    #[must_use]
    pub fn metadata(&self) -> ServiceMetadata {
        self.metadata.read().clone()
    }

    /// Cached build targets for a cloud build client, if refreshed.
    #[must_use]
    pub fn cached_build_targets(&self, name: &str) -> Option<Vec<String>> {
        self.metadata.read().build_targets.get(name).cloned()
    }

    /// Cached channels for a release store, if refreshed.
    #[must_use]
    pub fn cached_release_channels(&self, name: &str) -> Option<Vec<String>> {
        self.metadata.read().release_channels.get(name).cloned()
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("cloud_build", &self.cloud_build.read().keys().collect::<Vec<_>>())
            .field("release_stores", &self.release_stores.read().keys().collect::<Vec<_>>())
            .field("refreshed_at", &self.metadata.read().refreshed_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MockCloudBuildClient, MockReleaseClient};

    #[test]
    fn test_missing_service() {
        let services = ServiceContext::new();
        let err = services.release_store("itch").err().unwrap();
        assert_eq!(err.to_string(), "Service 'itch' is not registered");
    }

    #[tokio::test]
    async fn test_refresh_caches_metadata() {
        let mut cloud = MockCloudBuildClient::new();
        cloud
            .expect_list_build_targets()
            .times(1)
            .returning(|| Ok(vec!["windows".to_string(), "linux".to_string()]));
        let mut store = MockReleaseClient::new();
        store
            .expect_list_channels()
            .times(1)
            .returning(|| Ok(vec!["beta".to_string()]));

        let services = ServiceContext::new();
        services.register_cloud_build("ucb", Arc::new(cloud));
        services.register_release_store("itch", Arc::new(store));

        tokio_test::assert_ok!(services.refresh().await);

        assert_eq!(
            services.cached_build_targets("ucb"),
            Some(vec!["windows".to_string(), "linux".to_string()])
        );
        assert_eq!(services.cached_release_channels("itch"), Some(vec!["beta".to_string()]));
        assert!(services.metadata().refreshed_at.is_some());

        services.invalidate();
        assert!(services.cached_build_targets("ucb").is_none());
    }

    #[tokio::test]
    async fn test_refresh_reports_error_but_keeps_going() {
        let mut cloud = MockCloudBuildClient::new();
        cloud
            .expect_list_build_targets()
            .returning(|| Err(BuildflowError::Internal("offline".into())));
        let mut store = MockReleaseClient::new();
        store.expect_list_channels().returning(|| Ok(vec!["main".to_string()]));

        let services = ServiceContext::new();
        services.register_cloud_build("ucb", Arc::new(cloud));
        services.register_release_store("store", Arc::new(store));

        tokio_test::assert_err!(services.refresh().await);
        assert_eq!(services.cached_release_channels("store"), Some(vec!["main".to_string()]));
    }
}
