//! A destination that uploads nothing.

use super::Destination;
use crate::context::DestinationContext;
use crate::core::RunState;
use crate::errors::BuildflowResult;
use crate::registry::ComponentMap;
use async_trait::async_trait;

/// Logs and succeeds. Useful for dry runs.
#[derive(Debug, Default)]
pub struct NoOpDestination {
    run_state: RunState,
}

impl NoOpDestination {
    /// Stable type key.
    pub const TYPE_KEY: &'static str = "no_op";

    /// Creates a new no-op destination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the destination; it has no settings.
    pub fn from_map(_map: &ComponentMap) -> BuildflowResult<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl Destination for NoOpDestination {
    fn type_key(&self) -> &'static str {
        Self::TYPE_KEY
    }

    fn display_name(&self) -> String {
        "No upload".to_string()
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        Ok(ComponentMap::new())
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        ctx.log(format!("Skipping upload of '{}'", ctx.cached_path.display()));
        self.run_state.set_progress(1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::destination_context;

    #[test]
    fn test_round_trip() {
        let map = NoOpDestination::new().to_map().unwrap();
        assert!(map.is_empty());
        let restored = NoOpDestination::from_map(&map).unwrap();
        assert_eq!(restored.to_map().unwrap(), map);
        assert_eq!(restored.type_key(), NoOpDestination::TYPE_KEY);
    }

    #[tokio::test]
    async fn test_upload_succeeds_without_side_effects() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = destination_context(dir.path());
        let destination = NoOpDestination::new();

        destination.upload(&ctx).await.unwrap();
        assert!((destination.upload_progress() - 1.0).abs() < f32::EPSILON);
        assert!(ctx.step.lock().contains_log("Skipping upload"));
    }
}
