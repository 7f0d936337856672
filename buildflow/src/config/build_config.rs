//! One user-defined unit of work.

use crate::destinations::Destination;
use crate::format::{FormatContext, FormatLayer};
use crate::modifiers::Modifier;
use crate::sources::Source;
use std::path::{Component, Path};
use std::sync::Arc;
use uuid::Uuid;

/// Characters rejected in path segments entered by the user.
pub const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Returns true if `subfolder` is a relative path that stays below the folder it is joined to.
#[must_use]
pub fn is_contained_subfolder(subfolder: &str) -> bool {
    let path = Path::new(subfolder);
    !path.has_root()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// An item that can be switched off without removing it.
#[derive(Debug, Clone)]
pub struct Toggle<T> {
    /// Whether the item participates in runs.
    pub enabled: bool,
    /// The item.
    pub item: T,
}

impl<T> Toggle<T> {
    /// An enabled item.
    pub fn enabled(item: T) -> Self {
        Self { enabled: true, item }
    }

    /// A disabled item.
    pub fn disabled(item: T) -> Self {
        Self { enabled: false, item }
    }
}

/// One source of a config plus the cache subfolder it is copied into.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Whether the entry participates in runs.
    pub enabled: bool,
    /// The source.
    pub source: Arc<dyn Source>,
    /// Optional subfolder under the cache folder. May contain `{key}` placeholders.
    pub subfolder: Option<String>,
}

impl SourceEntry {
    /// An enabled entry copied into the cache root.
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            enabled: true,
            source,
            subfolder: None,
        }
    }

    /// Sets the subfolder.
    #[must_use]
    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = Some(subfolder.into());
        self
    }

    /// Disables the entry.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A build configuration: sources, modifiers and destinations.
///
/// The GUID is assigned once and is the name of the config's cache folder.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    guid: String,
    /// Display name.
    pub name: String,
    /// Whether the config participates in runs.
    pub enabled: bool,
    /// Source entries, cached in order.
    pub sources: Vec<SourceEntry>,
    /// Modifiers, run in order.
    pub modifiers: Vec<Toggle<Arc<dyn Modifier>>>,
    /// Destinations, uploaded concurrently.
    pub destinations: Vec<Toggle<Arc<dyn Destination>>>,
}

impl BuildConfig {
    /// Creates an enabled, empty config with a fresh GUID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_guid(Uuid::new_v4().to_string(), name)
    }

    pub(crate) fn with_guid(guid: String, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            enabled: true,
            sources: Vec::new(),
            modifiers: Vec::new(),
            destinations: Vec::new(),
        }
    }

    /// The stable GUID.
    #[must_use]
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Adds an enabled source copied into the cache root.
    #[must_use]
    pub fn with_source(self, source: impl Source + 'static) -> Self {
        self.with_source_entry(SourceEntry::new(Arc::new(source)))
    }

    /// Adds a source entry.
    #[must_use]
    pub fn with_source_entry(mut self, entry: SourceEntry) -> Self {
        self.sources.push(entry);
        self
    }

    /// Adds an enabled modifier.
    #[must_use]
    pub fn with_modifier(mut self, modifier: impl Modifier + 'static) -> Self {
        self.modifiers.push(Toggle::enabled(Arc::new(modifier)));
        self
    }

    /// Adds a shared modifier handle, keeping access to it.
    #[must_use]
    pub fn with_modifier_arc(mut self, modifier: Arc<dyn Modifier>) -> Self {
        self.modifiers.push(Toggle::enabled(modifier));
        self
    }

    /// Adds an enabled destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Destination + 'static) -> Self {
        self.destinations.push(Toggle::enabled(Arc::new(destination)));
        self
    }

    /// Adds a shared destination handle, keeping access to it.
    #[must_use]
    pub fn with_destination_arc(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destinations.push(Toggle::enabled(destination));
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enabled source entries with their indices.
    pub fn enabled_sources(&self) -> impl Iterator<Item = (usize, &SourceEntry)> {
        self.sources.iter().enumerate().filter(|(_, entry)| entry.enabled)
    }

    /// Enabled modifiers with their indices.
    pub fn enabled_modifiers(&self) -> impl Iterator<Item = (usize, &Arc<dyn Modifier>)> {
        self.modifiers
            .iter()
            .enumerate()
            .filter(|(_, toggle)| toggle.enabled)
            .map(|(index, toggle)| (index, &toggle.item))
    }

    /// Enabled destinations with their indices.
    pub fn enabled_destinations(&self) -> impl Iterator<Item = (usize, &Arc<dyn Destination>)> {
        self.destinations
            .iter()
            .enumerate()
            .filter(|(_, toggle)| toggle.enabled)
            .map(|(index, toggle)| (index, &toggle.item))
    }

    /// The config-level formatting layer.
    #[must_use]
    pub fn format_layer(&self, index: usize) -> FormatLayer {
        FormatLayer::new()
            .with("configName", self.name.clone())
            .with("configIndex", index.to_string())
            .with("guid", self.guid.clone())
    }

    /// Configuration issues of this config at position `index`.
    #[must_use]
    pub fn validate(&self, index: usize, format: &FormatContext) -> Vec<String> {
        let prefix = format!("Config {index} ('{}')", self.name);
        let mut issues = Vec::new();

        if self.enabled_sources().next().is_none() {
            issues.push(format!("{prefix} has no enabled sources"));
        }
        if self.enabled_destinations().next().is_none() {
            issues.push(format!("{prefix} has no enabled destinations"));
        }

        for (source_index, entry) in self.enabled_sources() {
            if let Some(subfolder) = &entry.subfolder {
                let resolved = format.format(subfolder);
                if resolved.contains(INVALID_PATH_CHARS) {
                    issues.push(format!(
                        "{prefix} source {source_index} subfolder '{resolved}' contains invalid characters"
                    ));
                }
                if !is_contained_subfolder(&resolved) {
                    issues.push(format!(
                        "{prefix} source {source_index} subfolder '{resolved}' must stay inside the cache folder"
                    ));
                }
            }
            issues.extend(
                entry
                    .source
                    .validate(format)
                    .into_iter()
                    .map(|issue| format!("{prefix} source {source_index}: {issue}")),
            );
        }
        for (modifier_index, modifier) in self.enabled_modifiers() {
            issues.extend(
                modifier
                    .validate()
                    .into_iter()
                    .map(|issue| format!("{prefix} modifier {modifier_index}: {issue}")),
            );
        }
        for (destination_index, destination) in self.enabled_destinations() {
            issues.extend(
                destination
                    .validate()
                    .into_iter()
                    .map(|issue| format!("{prefix} destination {destination_index}: {issue}")),
            );
        }

        issues
    }
}
