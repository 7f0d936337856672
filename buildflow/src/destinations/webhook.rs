//! Posts a chat notification about the build.

use super::Destination;
use crate::context::DestinationContext;
use crate::core::RunState;
use crate::errors::BuildflowResult;
use crate::format::FormatLayer;
use crate::registry::{from_component_map, to_component_map, ComponentMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Persisted settings of [`WebhookDestination`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Webhook URL.
    pub url: String,
    /// Message template. `{buildDescription}` holds the formatted description.
    pub message: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            message: "New build of {configName} uploaded: {buildDescription}".to_string(),
        }
    }
}

/// Posts `{"content": message}` to a chat webhook.
#[derive(Debug, Default)]
pub struct WebhookDestination {
    settings: WebhookSettings,
    run_state: RunState,
}

impl WebhookDestination {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "webhook";

    /// Creates a destination posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(WebhookSettings {
            url: url.into(),
            ..WebhookSettings::default()
        })
    }

    /// Creates a destination from its settings.
    #[must_use]
    pub fn from_settings(settings: WebhookSettings) -> Self {
        Self {
            settings,
            run_state: RunState::new(),
        }
    }

    /// Restores a destination from its persisted map.
    pub fn from_map(map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self::from_settings(from_component_map(map)?))
    }

    /// The persisted settings.
    #[must_use]
    pub fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    /// The message that would be posted for `ctx`.
    #[must_use]
    pub fn render_message(&self, ctx: &DestinationContext) -> String {
        ctx.format
            .child(FormatLayer::new().with("buildDescription", ctx.description.clone()))
            .format(&self.settings.message)
    }
}

#[async_trait]
impl Destination for WebhookDestination {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        "Webhook notification".to_string()
    }

    fn validate(&self) -> Vec<String> {
        let url = self.settings.url.trim();
        if url.is_empty() {
            vec!["Webhook destination has no URL".to_string()]
        } else if !(url.starts_with("https://") || url.starts_with("http://")) {
            vec![format!("Webhook URL '{url}' must start with http:// or https://")]
        } else {
            Vec::new()
        }
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        to_component_map(&self.settings)
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        ctx.check_cancelled()?;
        let content = self.render_message(ctx);
        self.run_state.begin("Sending notification");

        ctx.services
            .http()
            .post(&self.settings.url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;

        self.run_state.finish();
        self.run_state.set_progress(1.0);
        ctx.log("Sent webhook notification");
        Ok(())
    }
}
