//! Command-line entry point: run or validate a task document.

use anyhow::{Context, Result};
use buildflow::config::{load_task, save_task, LoadedTask, PipelineSettings, TaskDocument};
use buildflow::observability::init_tracing;
use buildflow::pipeline::{LoggingProgressSink, UploadTask};
use buildflow::registry::ComponentRegistry;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "buildflow", version, about = "Fetch, cache, modify and upload game builds")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every stage of a task.
    Run(TaskArgs),
    /// Check a task for configuration issues without running it.
    Validate(TaskArgs),
}

#[derive(Debug, Args)]
struct TaskArgs {
    /// Path to the task document.
    task: PathBuf,

    /// Settings file; overrides settings stored in the task document.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run(args) => run(&args).await,
        Command::Validate(args) => validate(&args),
    }
}

fn load(args: &TaskArgs) -> Result<UploadTask> {
    let registry = ComponentRegistry::with_builtin();
    let loaded = load_task(&args.task, &registry)
        .with_context(|| format!("failed to load task '{}'", args.task.display()))?;
    if loaded.needs_save {
        resave(&args.task, &loaded)?;
    }

    let settings = match (&args.settings, loaded.settings) {
        (Some(path), _) => PipelineSettings::load(Some(path))
            .with_context(|| format!("failed to load settings '{}'", path.display()))?,
        (None, Some(stored)) => stored.with_env_overrides(),
        (None, None) => PipelineSettings::load(None)?,
    };

    Ok(UploadTask::new(loaded.name)
        .with_settings(settings)
        .with_configs(loaded.configs))
}

fn resave(path: &Path, loaded: &LoadedTask) -> Result<()> {
    let document = TaskDocument::from_configs(loaded.name.clone(), loaded.settings.clone(), &loaded.configs)?;
    save_task(path, &document).with_context(|| format!("failed to save migrated task '{}'", path.display()))?;
    info!(path = %path.display(), "Saved migrated task document");
    Ok(())
}

fn validate(args: &TaskArgs) -> Result<ExitCode> {
    let task = load(args)?;
    let issues = task.validate();
    if issues.is_empty() {
        println!("Task '{}' is valid ({} configs)", task.name(), task.configs().len());
        return Ok(ExitCode::SUCCESS);
    }
    for issue in &issues {
        println!("- {issue}");
    }
    Ok(ExitCode::FAILURE)
}

async fn run(args: &TaskArgs) -> Result<ExitCode> {
    let task = Arc::new(load(args)?.with_progress_sink(Arc::new(LoggingProgressSink::info())));

    let cancel_on_ctrl_c = Arc::clone(&task);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel_on_ctrl_c.cancel("Interrupted by user");
        }
    });

    let outcome = task.run().await?;

    if let Some(path) = &args.report {
        let json = serde_json::to_vec_pretty(&outcome.report().snapshot())?;
        std::fs::write(path, json).with_context(|| format!("failed to write report '{}'", path.display()))?;
    }

    println!("{}", outcome.message);
    for failure in outcome.upload_failures() {
        println!(
            "- Config {} destination {}: {}",
            failure.config_index, failure.destination_index, failure.fail_reason
        );
    }
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
