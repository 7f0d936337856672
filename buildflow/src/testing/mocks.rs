//! Mock components for testing.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::{DestinationContext, ModifyContext, SourceContext};
use crate::core::RunState;
use crate::destinations::Destination;
use crate::errors::{BuildflowError, BuildflowResult};
use crate::fsops::FsError;
use crate::modifiers::Modifier;
use crate::registry::ComponentMap;
use crate::sources::Source;

const MOCK_TYPE_KEY: &str = "mock";

/// What a mock call does.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Behavior {
    Succeed,
    Fail(String),
    Panic(String),
}

impl Behavior {
    fn apply(&self, fail: impl FnOnce(String) -> BuildflowError) -> BuildflowResult<()> {
        match self {
            Self::Succeed => Ok(()),
            Self::Fail(message) => Err(fail(message.clone())),
            Self::Panic(message) => panic!("{message}"),
        }
    }
}

/// A source that "fetches" an existing local path.
#[derive(Debug)]
pub struct MockSource {
    path: PathBuf,
    behavior: Behavior,
    delay: Duration,
    run_state: RunState,
    fetched: RwLock<Option<PathBuf>>,
    fetch_count: AtomicUsize,
}

impl MockSource {
    /// Creates a source resolving to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            behavior: Behavior::Succeed,
            delay: Duration::ZERO,
            run_state: RunState::new(),
            fetched: RwLock::new(None),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Creates a source whose fetch returns an error.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            ..Self::new("")
        }
    }

    /// Creates a source whose fetch panics.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Panic(message.into()),
            ..Self::new("")
        }
    }

    /// Spreads the fetch over `delay`, reporting progress in four steps.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of fetch calls.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn type_key(&self) -> &'static str {
        MOCK_TYPE_KEY
    }

    fn display_name(&self) -> String {
        format!("mock source '{}'", self.path.display())
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        Ok(ComponentMap::new())
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn fetch(&self, ctx: &SourceContext) -> BuildflowResult<()> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.run_state.begin("Fetching");

        if !self.delay.is_zero() {
            for step in 1..=4_u8 {
                tokio::select! {
                    () = tokio::time::sleep(self.delay / 4) => {}
                    () = ctx.cancel.cancelled() => {}
                }
                ctx.check_cancelled()?;
                self.run_state.set_progress(f32::from(step) / 4.0);
            }
        }
        self.behavior.apply(BuildflowError::source)?;

        if !self.path.exists() {
            return Err(FsError::NotFound {
                path: self.path.clone(),
            }
            .into());
        }
        *self.fetched.write() = Some(self.path.clone());
        self.run_state.set_progress(1.0);
        self.run_state.finish();
        Ok(())
    }

    fn source_file_path(&self) -> Option<PathBuf> {
        self.fetched.read().clone()
    }
}

/// A modifier that records the paths it was applied to.
#[derive(Debug)]
pub struct CountingModifier {
    behavior: Behavior,
    ignored_extension: Option<String>,
    calls: Mutex<Vec<PathBuf>>,
}

impl Default for CountingModifier {
    fn default() -> Self {
        Self {
            behavior: Behavior::Succeed,
            ignored_extension: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl CountingModifier {
    /// Creates a modifier that succeeds and ignores nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a modifier whose call returns an error.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            ..Self::default()
        }
    }

    /// Vetoes files with `extension` while caching.
    #[must_use]
    pub fn ignoring_extension(mut self, extension: impl Into<String>) -> Self {
        self.ignored_extension = Some(extension.into());
        self
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Cached paths passed to each call.
    #[must_use]
    pub fn recorded_paths(&self) -> Vec<PathBuf> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Modifier for CountingModifier {
    fn type_key(&self) -> &'static str {
        MOCK_TYPE_KEY
    }

    fn display_name(&self) -> String {
        "Counting modifier".to_string()
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        Ok(ComponentMap::new())
    }

    fn ignore_file_during_cache(&self, relative_path: &Path, _config_index: usize) -> bool {
        self.ignored_extension.as_deref().is_some_and(|ignored| {
            relative_path
                .extension()
                .is_some_and(|extension| extension == ignored)
        })
    }

    async fn modify_build_at_path(&self, cached_path: &Path, _ctx: &ModifyContext) -> BuildflowResult<()> {
        self.calls.lock().push(cached_path.to_path_buf());
        self.behavior.apply(BuildflowError::modifier)
    }
}

/// A destination that records its calls.
#[derive(Debug)]
pub struct MockDestination {
    prepare: Behavior,
    upload: Behavior,
    run_state: RunState,
    prepare_count: AtomicUsize,
    upload_count: AtomicUsize,
    clean_up_count: AtomicUsize,
    descriptions: Mutex<Vec<String>>,
}

impl Default for MockDestination {
    fn default() -> Self {
        Self {
            prepare: Behavior::Succeed,
            upload: Behavior::Succeed,
            run_state: RunState::new(),
            prepare_count: AtomicUsize::new(0),
            upload_count: AtomicUsize::new(0),
            clean_up_count: AtomicUsize::new(0),
            descriptions: Mutex::new(Vec::new()),
        }
    }
}

impl MockDestination {
    /// Creates a destination that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a destination whose upload returns an error.
    #[must_use]
    pub fn failing_upload(message: impl Into<String>) -> Self {
        Self {
            upload: Behavior::Fail(message.into()),
            ..Self::default()
        }
    }

    /// Creates a destination whose prepare returns an error.
    #[must_use]
    pub fn failing_prepare(message: impl Into<String>) -> Self {
        Self {
            prepare: Behavior::Fail(message.into()),
            ..Self::default()
        }
    }

    /// Creates a destination whose upload panics.
    #[must_use]
    pub fn panicking_upload(message: impl Into<String>) -> Self {
        Self {
            upload: Behavior::Panic(message.into()),
            ..Self::default()
        }
    }

    /// Number of prepare calls.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.prepare_count.load(Ordering::SeqCst)
    }

    /// Number of upload calls.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }

    /// Number of clean-up calls.
    #[must_use]
    pub fn clean_up_count(&self) -> usize {
        self.clean_up_count.load(Ordering::SeqCst)
    }

    /// Build descriptions received by upload.
    #[must_use]
    pub fn descriptions(&self) -> Vec<String> {
        self.descriptions.lock().clone()
    }
}

#[async_trait]
impl Destination for MockDestination {
    fn type_key(&self) -> &'static str {
        MOCK_TYPE_KEY
    }

    fn display_name(&self) -> String {
        "mock destination".to_string()
    }

    fn to_map(&self) -> BuildflowResult<ComponentMap> {
        Ok(ComponentMap::new())
    }

    fn run_state(&self) -> &RunState {
        &self.run_state
    }

    async fn prepare(&self, _ctx: &DestinationContext) -> BuildflowResult<()> {
        self.prepare_count.fetch_add(1, Ordering::SeqCst);
        self.prepare.apply(BuildflowError::destination)
    }

    async fn upload(&self, ctx: &DestinationContext) -> BuildflowResult<()> {
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        self.descriptions.lock().push(ctx.description.clone());
        self.upload.apply(BuildflowError::destination)?;
        self.run_state.set_progress(1.0);
        Ok(())
    }

    async fn clean_up(&self) {
        self.clean_up_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{branch_context, destination_context};

    #[tokio::test]
    async fn test_mock_source_resolves_existing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = MockSource::new(dir.path());
        source.fetch(&branch_context(0)).await.unwrap();
        assert_eq!(source.source_file_path(), Some(dir.path().to_path_buf()));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_mocks() {
        let err = MockSource::failing("offline").fetch(&branch_context(0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Source failed: offline");

        let destination = MockDestination::failing_upload("HTTP 500");
        let ctx = destination_context(Path::new("/tmp"));
        destination.prepare(&ctx).await.unwrap();
        assert!(destination.upload(&ctx).await.is_err());
        assert_eq!(destination.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_delayed_source_wakes_on_cancel() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = MockSource::new(dir.path()).with_delay(Duration::from_secs(60));
        let ctx = branch_context(0);
        let cancel = ctx.cancel.clone();

        let (result, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(5), source.fetch(&ctx)),
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel("stop");
            }
        );
        let err = result.expect("fetch should return promptly").unwrap_err();
        assert!(err.is_cancelled());
        assert!(source.source_file_path().is_none());
    }

    #[test]
    fn test_counting_modifier_ignores_extension() {
        let modifier = CountingModifier::new().ignoring_extension("pdb");
        assert!(modifier.ignore_file_during_cache(Path::new("bin/game.pdb"), 0));
        assert!(!modifier.ignore_file_during_cache(Path::new("bin/game.exe"), 0));
    }
}
