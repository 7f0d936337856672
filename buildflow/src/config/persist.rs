//! Versioned JSON task documents.
//!
//! Documents are migrated step by step up to [`CURRENT_VERSION`] before they
//! are decoded. Component settings stay flat maps so each type can default and
//! migrate its own keys.

use super::{BuildConfig, PipelineSettings, SourceEntry, Toggle};
use crate::errors::{BuildflowError, BuildflowResult};
use crate::registry::{ComponentMap, ComponentRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Version written by [`TaskDocument::from_configs`].
pub const CURRENT_VERSION: u64 = 2;

fn default_true() -> bool {
    true
}

/// A persisted modifier or destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Stable type key.
    #[serde(rename = "type")]
    pub type_key: String,
    /// Whether the component is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings.
    #[serde(default)]
    pub data: ComponentMap,
}

/// A persisted source entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable type key.
    #[serde(rename = "type")]
    pub type_key: String,
    /// Whether the entry is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional cache subfolder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
    /// Type-specific settings.
    #[serde(default)]
    pub data: ComponentMap,
}

/// A persisted build config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Config GUID; absent in documents written before GUIDs existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the config is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Source entries.
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    /// Modifiers.
    #[serde(default)]
    pub modifiers: Vec<ComponentRecord>,
    /// Destinations.
    #[serde(default)]
    pub destinations: Vec<ComponentRecord>,
}

/// A persisted upload task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    /// Document format version.
    #[serde(default)]
    pub version: u64,
    /// Task name.
    #[serde(default)]
    pub name: String,
    /// Optional pipeline settings stored with the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<PipelineSettings>,
    /// Build configs.
    #[serde(default)]
    pub configs: Vec<ConfigRecord>,
}

/// A decoded task document.
#[derive(Debug)]
pub struct LoadedTask {
    /// Task name.
    pub name: String,
    /// Settings stored with the task, if any.
    pub settings: Option<PipelineSettings>,
    /// Build configs, in document order.
    pub configs: Vec<BuildConfig>,
    /// True when the document was migrated or GUIDs were assigned, so it should be saved.
    pub needs_save: bool,
}

/// Upgrades a raw document to [`CURRENT_VERSION`].
///
/// - v0 → v1: a config's single `source` becomes a one-entry `sources` list.
/// - v1 → v2: the top-level `buildConfigs` list is renamed to `configs`.
pub fn migrate_document(mut document: Value) -> BuildflowResult<Value> {
    let mut version = document.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > CURRENT_VERSION {
        return Err(BuildflowError::InvalidConfiguration(vec![format!(
            "Document version {version} is newer than the supported version {CURRENT_VERSION}"
        )]));
    }

    let object = document.as_object_mut().ok_or_else(|| {
        BuildflowError::InvalidConfiguration(vec!["Task document must be a JSON object".to_string()])
    })?;

    while version < CURRENT_VERSION {
        match version {
            0 => migrate_v0_single_source(object),
            1 => migrate_v1_rename_configs(object),
            _ => {}
        }
        version += 1;
        debug!(version, "Migrated task document");
    }
    object.insert("version".to_string(), Value::from(CURRENT_VERSION));
    Ok(document)
}

fn migrate_v0_single_source(document: &mut serde_json::Map<String, Value>) {
    for key in ["buildConfigs", "configs"] {
        let Some(Value::Array(configs)) = document.get_mut(key) else {
            continue;
        };
        for config in configs.iter_mut().filter_map(Value::as_object_mut) {
            if config.contains_key("sources") {
                continue;
            }
            if let Some(source) = config.remove("source") {
                config.insert("sources".to_string(), Value::Array(vec![source]));
            }
        }
    }
}

fn migrate_v1_rename_configs(document: &mut serde_json::Map<String, Value>) {
    if document.contains_key("configs") {
        return;
    }
    if let Some(configs) = document.remove("buildConfigs") {
        document.insert("configs".to_string(), configs);
    }
}

impl TaskDocument {
    /// Parses and migrates a document from JSON text.
    pub fn parse(text: &str) -> BuildflowResult<(Self, bool)> {
        let raw: Value = serde_json::from_str(text)?;
        let original_version = raw.get("version").and_then(Value::as_u64).unwrap_or(0);
        let document: Self = serde_json::from_value(migrate_document(raw)?)?;
        Ok((document, original_version < CURRENT_VERSION))
    }

    /// Builds a current-version document from live configs.
    pub fn from_configs(
        name: impl Into<String>,
        settings: Option<PipelineSettings>,
        configs: &[BuildConfig],
    ) -> BuildflowResult<Self> {
        let configs = configs
            .iter()
            .map(|config| {
                Ok(ConfigRecord {
                    guid: Some(config.guid().to_string()),
                    name: config.name.clone(),
                    enabled: config.enabled,
                    sources: config
                        .sources
                        .iter()
                        .map(|entry| {
                            Ok(SourceRecord {
                                type_key: entry.source.type_key().to_string(),
                                enabled: entry.enabled,
                                subfolder: entry.subfolder.clone(),
                                data: entry.source.to_map()?,
                            })
                        })
                        .collect::<BuildflowResult<_>>()?,
                    modifiers: config
                        .modifiers
                        .iter()
                        .map(|toggle| {
                            Ok(ComponentRecord {
                                type_key: toggle.item.type_key().to_string(),
                                enabled: toggle.enabled,
                                data: toggle.item.to_map()?,
                            })
                        })
                        .collect::<BuildflowResult<_>>()?,
                    destinations: config
                        .destinations
                        .iter()
                        .map(|toggle| {
                            Ok(ComponentRecord {
                                type_key: toggle.item.type_key().to_string(),
                                enabled: toggle.enabled,
                                data: toggle.item.to_map()?,
                            })
                        })
                        .collect::<BuildflowResult<_>>()?,
                })
            })
            .collect::<BuildflowResult<_>>()?;

        Ok(Self {
            version: CURRENT_VERSION,
            name: name.into(),
            settings,
            configs,
        })
    }

    /// Instantiates every component through `registry`.
    ///
    /// Configs without a GUID get a new one; the caller should save the task afterwards.
    pub fn into_task(self, registry: &ComponentRegistry) -> BuildflowResult<LoadedTask> {
        let mut assigned = 0;
        let mut configs = Vec::with_capacity(self.configs.len());

        for record in self.configs {
            let guid = match record.guid.filter(|guid| !guid.is_empty()) {
                Some(guid) => guid,
                None => {
                    assigned += 1;
                    Uuid::new_v4().to_string()
                }
            };

            let mut config = BuildConfig::with_guid(guid, record.name).enabled(record.enabled);
            for source in record.sources {
                config.sources.push(SourceEntry {
                    enabled: source.enabled,
                    source: registry.create_source(&source.type_key, &source.data)?,
                    subfolder: source.subfolder,
                });
            }
            for modifier in record.modifiers {
                config.modifiers.push(Toggle {
                    enabled: modifier.enabled,
                    item: registry.create_modifier(&modifier.type_key, &modifier.data)?,
                });
            }
            for destination in record.destinations {
                config.destinations.push(Toggle {
                    enabled: destination.enabled,
                    item: registry.create_destination(&destination.type_key, &destination.data)?,
                });
            }
            configs.push(config);
        }

        if assigned > 0 {
            info!(count = assigned, "Assigned GUIDs to configs without one");
        }

        Ok(LoadedTask {
            name: self.name,
            settings: self.settings,
            configs,
            needs_save: assigned > 0,
        })
    }
}

/// Loads, migrates and instantiates a task document from disk.
pub fn load_task(path: &Path, registry: &ComponentRegistry) -> BuildflowResult<LoadedTask> {
    let text = std::fs::read_to_string(path)?;
    let (document, migrated) = TaskDocument::parse(&text)?;
    let mut task = document.into_task(registry)?;
    task.needs_save |= migrated;
    Ok(task)
}

/// Writes a task document to disk as pretty JSON.
pub fn save_task(path: &Path, document: &TaskDocument) -> BuildflowResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(document)?)?;
    Ok(())
}
