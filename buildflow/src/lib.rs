//! # Buildflow
//!
//! A staged build distribution pipeline: fetch game builds from one or more
//! sources, cache them per build config, run a modifier chain over each
//! cached folder and upload the result to any number of destinations.
//!
//! - **Fixed stages**: get sources, cache sources, modify cached sources, upload
//! - **Concurrent branches**: every enabled config runs in parallel within a stage
//! - **Per-stage gating**: any failed branch stops the run after the stage completes
//! - **Structured reports**: one step result per `(stage, config, item)`
//! - **Cancellation**: a run-wide token checked before every call and between files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildflow::prelude::*;
//!
//! let task = UploadTask::new("nightly").with_config(
//!     BuildConfig::new("Windows")
//!         .with_source(LocalPathSource::new("builds/windows"))
//!         .with_modifier(ExcludeFilesModifier::new([r"\.pdb$"], ExcludeMode::DeleteFromCache))
//!         .with_destination(LocalPathDestination::new("out/{configName}", DuplicateFileHandling::Error)),
//! );
//!
//! let outcome = task.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod destinations;
pub mod errors;
pub mod format;
pub mod fsops;
pub mod modifiers;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod services;
pub mod sources;
pub mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{load_task, save_task, BuildConfig, PipelineSettings, SourceEntry, TaskDocument};
    pub use crate::context::{BranchContext, DestinationContext, ModifyContext, SourceContext};
    pub use crate::core::{DuplicateFileHandling, RunState, StepType, TaskState};
    pub use crate::destinations::{
        Destination, LocalPathDestination, NoOpDestination, ReleaseStoreDestination, UploadResult,
        WebhookDestination,
    };
    pub use crate::errors::{BuildflowError, BuildflowResult};
    pub use crate::format::{FormatContext, FormatLayer};
    pub use crate::modifiers::{CompressModifier, DecompressModifier, ExcludeFilesModifier, ExcludeMode, Modifier};
    pub use crate::pipeline::{LoggingProgressSink, ProgressSink, TaskOutcome, UploadTask};
    pub use crate::registry::ComponentRegistry;
    pub use crate::report::{Report, StepResult};
    pub use crate::services::{CloudBuildClient, ReleaseClient, ServiceContext};
    pub use crate::sources::{CloudBuildSource, LocalPathSource, Source};
}
