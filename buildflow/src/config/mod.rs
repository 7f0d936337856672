//! Build configs, pipeline settings and task persistence.

mod build_config;
pub mod persist;
mod settings;

pub use build_config::{is_contained_subfolder, BuildConfig, SourceEntry, Toggle, INVALID_PATH_CHARS};
pub use persist::{load_task, migrate_document, save_task, LoadedTask, TaskDocument, CURRENT_VERSION};
pub use settings::{PipelineSettings, ENV_CACHE_ROOT, ENV_DOWNLOAD_ROOT, ENV_POLL_INTERVAL_MS};
