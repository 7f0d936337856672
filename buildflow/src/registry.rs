//! Registry of component factories keyed by stable type keys.
//!
//! Type keys are persisted in task documents and must never change, unlike
//! display names.

use crate::destinations::{
    Destination, LocalPathDestination, NoOpDestination, ReleaseStoreDestination, WebhookDestination,
};
use crate::errors::{BuildflowError, BuildflowResult};
use crate::modifiers::{CompressModifier, DecompressModifier, ExcludeFilesModifier, Modifier};
use crate::sources::{CloudBuildSource, LocalPathSource, Source};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A component's persisted settings: a flat, camelCase string-keyed map.
pub type ComponentMap = serde_json::Map<String, serde_json::Value>;

/// Factory building a source from its persisted map.
pub type SourceFactory = Arc<dyn Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Source>> + Send + Sync>;
/// Factory building a modifier from its persisted map.
pub type ModifierFactory = Arc<dyn Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Modifier>> + Send + Sync>;
/// Factory building a destination from its persisted map.
pub type DestinationFactory =
    Arc<dyn Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Destination>> + Send + Sync>;

/// Serializes typed settings into a component map.
pub fn to_component_map<T: Serialize>(settings: &T) -> BuildflowResult<ComponentMap> {
    match serde_json::to_value(settings)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(BuildflowError::Internal(format!(
            "Component settings must serialize to an object, got {other}"
        ))),
    }
}

/// Deserializes typed settings from a component map. Missing keys take their defaults.
pub fn from_component_map<T: DeserializeOwned>(map: &ComponentMap) -> BuildflowResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(map.clone()))?)
}

/// Maps stable type keys to component factories.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    sources: BTreeMap<String, SourceFactory>,
    modifiers: BTreeMap<String, ModifierFactory>,
    destinations: BTreeMap<String, DestinationFactory>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in component.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();

        registry.register_source(LocalPathSource::TYPE_KEY, |map| {
            Ok(Arc::new(LocalPathSource::from_map(map)?) as Arc<dyn Source>)
        });
        registry.register_source(CloudBuildSource::TYPE_KEY, |map| {
            Ok(Arc::new(CloudBuildSource::from_map(map)?) as Arc<dyn Source>)
        });

        registry.register_modifier(ExcludeFilesModifier::TYPE_KEY, |map| {
            Ok(Arc::new(ExcludeFilesModifier::from_map(map)?) as Arc<dyn Modifier>)
        });
        registry.register_modifier(CompressModifier::TYPE_KEY, |map| {
            Ok(Arc::new(CompressModifier::from_map(map)?) as Arc<dyn Modifier>)
        });
        registry.register_modifier(DecompressModifier::TYPE_KEY, |map| {
            Ok(Arc::new(DecompressModifier::from_map(map)?) as Arc<dyn Modifier>)
        });

        registry.register_destination(NoOpDestination::TYPE_KEY, |map| {
            Ok(Arc::new(NoOpDestination::from_map(map)?) as Arc<dyn Destination>)
        });
        registry.register_destination(LocalPathDestination::TYPE_KEY, |map| {
            Ok(Arc::new(LocalPathDestination::from_map(map)?) as Arc<dyn Destination>)
        });
        registry.register_destination(ReleaseStoreDestination::TYPE_KEY, |map| {
            Ok(Arc::new(ReleaseStoreDestination::from_map(map)?) as Arc<dyn Destination>)
        });
        registry.register_destination(WebhookDestination::TYPE_KEY, |map| {
            Ok(Arc::new(WebhookDestination::from_map(map)?) as Arc<dyn Destination>)
        });

        registry
    }

    /// Registers (or replaces) a source factory.
    pub fn register_source<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Source>> + Send + Sync + 'static,
    {
        self.sources.insert(key.into(), Arc::new(factory));
    }

    /// Registers (or replaces) a modifier factory.
    pub fn register_modifier<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Modifier>> + Send + Sync + 'static,
    {
        self.modifiers.insert(key.into(), Arc::new(factory));
    }

    /// Registers (or replaces) a destination factory.
    pub fn register_destination<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentMap) -> BuildflowResult<Arc<dyn Destination>> + Send + Sync + 'static,
    {
        self.destinations.insert(key.into(), Arc::new(factory));
    }

    /// Builds a source from its type key and persisted map.
    pub fn create_source(&self, key: &str, map: &ComponentMap) -> BuildflowResult<Arc<dyn Source>> {
        let factory = self.sources.get(key).ok_or_else(|| BuildflowError::UnknownComponent {
            kind: "source",
            key: key.to_string(),
        })?;
        factory(map)
    }

    /// Builds a modifier from its type key and persisted map.
    pub fn create_modifier(&self, key: &str, map: &ComponentMap) -> BuildflowResult<Arc<dyn Modifier>> {
        let factory = self.modifiers.get(key).ok_or_else(|| BuildflowError::UnknownComponent {
            kind: "modifier",
            key: key.to_string(),
        })?;
        factory(map)
    }

    /// Builds a destination from its type key and persisted map.
    pub fn create_destination(&self, key: &str, map: &ComponentMap) -> BuildflowResult<Arc<dyn Destination>> {
        let factory = self
            .destinations
            .get(key)
            .ok_or_else(|| BuildflowError::UnknownComponent {
                kind: "destination",
                key: key.to_string(),
            })?;
        factory(map)
    }

    /// Registered source keys, sorted.
    #[must_use]
    pub fn source_keys(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Registered modifier keys, sorted.
    #[must_use]
    pub fn modifier_keys(&self) -> Vec<&str> {
        self.modifiers.keys().map(String::as_str).collect()
    }

    /// Registered destination keys, sorted.
    #[must_use]
    pub fn destination_keys(&self) -> Vec<&str> {
        self.destinations.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("sources", &self.source_keys())
            .field("modifiers", &self.modifier_keys())
            .field("destinations", &self.destination_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_keys() {
        let registry = ComponentRegistry::with_builtin();
        assert_eq!(registry.source_keys(), vec!["cloud_build", "local_path"]);
        assert_eq!(registry.modifier_keys(), vec!["compress", "decompress", "exclude_files"]);
        assert_eq!(
            registry.destination_keys(),
            vec!["local_path", "no_op", "release_store", "webhook"]
        );
    }

    #[test]
    fn test_unknown_key() {
        let registry = ComponentRegistry::with_builtin();
        let err = registry.create_destination("ftp", &ComponentMap::new()).err().unwrap();
        assert_eq!(err.to_string(), "Unknown destination type 'ftp'");
    }

    #[test]
    fn test_create_from_map() {
        let registry = ComponentRegistry::with_builtin();
        let map = match json!({"path": "/builds/win64"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let source = registry.create_source("local_path", &map).unwrap();
        assert_eq!(source.type_key(), "local_path");
        assert_eq!(source.to_map().unwrap()["path"], json!("/builds/win64"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ComponentRegistry::new();
        registry.register_destination("no_op", |_| {
            Err(BuildflowError::Internal("disabled".into()))
        });
        assert!(registry.create_destination("no_op", &ComponentMap::new()).is_err());
        assert_eq!(registry.destination_keys(), vec!["no_op"]);
    }
}
