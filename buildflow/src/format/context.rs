//! Layered string-formatting context.
//!
//! Lookup falls through the layers in order (item → config → task →
//! process-wide); the first layer that knows a key wins. Unknown
//! placeholders are left verbatim.

use chrono::Local;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of placeholder values.
pub trait FormatSource: Send + Sync + Debug {
    /// Returns the value for `key`, if this source knows it.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// A plain key/value layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatLayer {
    values: HashMap<String, String>,
}

impl FormatLayer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl FormatSource for FormatLayer {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Process-wide values: `date`, `time`, `dateTime`, `unixTime`, `machineName`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessFormatSource;

impl FormatSource for ProcessFormatSource {
    fn lookup(&self, key: &str) -> Option<String> {
        let now = Local::now();
        match key {
            "date" => Some(now.format("%Y-%m-%d").to_string()),
            "time" => Some(now.format("%H-%M-%S").to_string()),
            "dateTime" => Some(now.format("%Y-%m-%d %H:%M:%S").to_string()),
            "unixTime" => Some(now.timestamp().to_string()),
            "machineName" => std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .ok(),
            _ => None,
        }
    }
}

/// An ordered stack of lookup sources, most specific first.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    layers: Vec<Arc<dyn FormatSource>>,
}

impl FormatContext {
    /// Creates a context with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context holding only the process-wide layer.
    #[must_use]
    pub fn process() -> Self {
        Self {
            layers: vec![Arc::new(ProcessFormatSource)],
        }
    }

    /// Returns a new context with `layer` consulted before every existing layer.
    #[must_use]
    pub fn child(&self, layer: impl FormatSource + 'static) -> Self {
        let mut layers: Vec<Arc<dyn FormatSource>> = Vec::with_capacity(self.layers.len() + 1);
        layers.push(Arc::new(layer));
        layers.extend(self.layers.iter().cloned());
        Self { layers }
    }

    /// Looks a key up through the layers.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.lookup(key))
    }

    /// Replaces every known `{key}` in `template`.
    #[must_use]
    pub fn format(&self, template: &str) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            output.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find(['{', '}']) {
                Some(close) if after.as_bytes()[close] == b'}' => {
                    let key = &after[..close];
                    match self.lookup(key) {
                        Some(value) if !key.is_empty() => output.push_str(&value),
                        _ => {
                            output.push('{');
                            output.push_str(key);
                            output.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    output.push('{');
                    rest = after;
                }
            }
        }

        output.push_str(rest);
        output
    }
}
