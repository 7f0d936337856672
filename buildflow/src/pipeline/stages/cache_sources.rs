//! Copies or extracts fetched sources into each config's cache folder.

use super::{average, TaskStep};
use crate::cancellation::CancellationToken;
use crate::config::is_contained_subfolder;
use crate::context::run_blocking;
use crate::core::{DuplicateFileHandling, ProgressHandle, StepType};
use crate::errors::BuildflowResult;
use crate::fsops::{copy_directory, copy_file, extract_zip, is_archive, CopyOptions, CopyStats, FsError};
use crate::modifiers::Modifier;
use crate::pipeline::branches::BranchSet;
use crate::pipeline::guard::guarded;
use crate::pipeline::run::TaskRun;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CacheSourcesStep;

impl TaskStep for CacheSourcesStep {
    fn step_type(&self) -> StepType {
        StepType::CacheSources
    }

    fn spawn_branches(&self, run: &Arc<TaskRun>, branches: &mut BranchSet) {
        for (slot, (config_index, config)) in run.enabled_configs().iter().enumerate() {
            let handles: Vec<ProgressHandle> = config.enabled_sources().map(|_| ProgressHandle::new()).collect();
            let sampled = handles.clone();
            branches.spawn(
                format!("cache_sources[{config_index}]"),
                cache_config(Arc::clone(run), slot, handles),
                Box::new(move || average(sampled.iter().map(ProgressHandle::get))),
            );
        }
    }
}

/// One source entry to copy into the cache.
struct CacheJob {
    source: PathBuf,
    cache_root: PathBuf,
    cache_folder: PathBuf,
    target: PathBuf,
    clear_stale: bool,
    auto_decompress: bool,
    policy: DuplicateFileHandling,
    config_index: usize,
    modifiers: Vec<Arc<dyn Modifier>>,
}

struct CacheOutcome {
    stale_removed: bool,
    copied_from: PathBuf,
    stats: CopyStats,
}

/// Caches every enabled source entry of one config, failing fast.
async fn cache_config(run: Arc<TaskRun>, slot: usize, handles: Vec<ProgressHandle>) -> bool {
    let (config_index, config) = &run.enabled_configs()[slot];
    let config_index = *config_index;
    let settings = run.settings();
    let cache_folder = settings.cache_folder(config.guid());
    let format = run.config_format(config_index, config);
    let modifiers: Vec<Arc<dyn Modifier>> = config
        .enabled_modifiers()
        .map(|(_, modifier)| modifier.clone())
        .collect();

    let mut first_entry = true;
    for ((source_index, entry), progress) in config.enabled_sources().zip(handles) {
        let step = run
            .report()
            .new_report(StepType::CacheSources, config_index, source_index);

        let Some(source_path) = entry.source.source_file_path() else {
            step.lock().set_failed(format!(
                "{} has no fetched file to cache",
                entry.source.display_name()
            ));
            return false;
        };

        let target = match cache_target(&cache_folder, entry.subfolder.as_deref().map(|sub| format.format(sub))) {
            Ok(target) => target,
            Err(reason) => {
                step.lock().set_failed(reason);
                return false;
            }
        };
        let job = CacheJob {
            source: source_path.clone(),
            cache_root: settings.cache_root.clone(),
            cache_folder: cache_folder.clone(),
            target,
            clear_stale: first_entry,
            auto_decompress: settings.auto_decompress_archives,
            policy: settings.cache_duplicate_file_handling,
            config_index,
            modifiers: modifiers.clone(),
        };
        first_entry = false;

        let cancel = run.cancel_token().clone();
        let step_for_logs = step.clone();
        let stale_folder = cache_folder.clone();
        let cached = guarded(
            &step,
            run.cancel_token(),
            |err| format!("Failed to cache '{}': {err}", source_path.display()),
            async move {
                let outcome = run_blocking(move || run_cache_job(&job, &cancel, &progress)).await?;
                let mut result = step_for_logs.lock();
                if outcome.stale_removed {
                    result.add_warning(format!(
                        "Cache folder '{}' already existed from a previous run and was deleted",
                        stale_folder.display()
                    ));
                }
                result.add_log(format!(
                    "Cached {} files from '{}' ({} skipped, {} ignored)",
                    outcome.stats.written(),
                    outcome.copied_from.display(),
                    outcome.stats.skipped,
                    outcome.stats.ignored
                ));
                Ok(())
            },
        )
        .await;
        if !cached {
            return false;
        }
    }

    run.set_cached_location(config_index, cache_folder);
    true
}

/// Where one source entry lands inside `cache_folder`.
fn cache_target(cache_folder: &Path, subfolder: Option<String>) -> Result<PathBuf, String> {
    match subfolder {
        Some(subfolder) if !is_contained_subfolder(&subfolder) => Err(format!(
            "Subfolder '{subfolder}' escapes the cache folder '{}'",
            cache_folder.display()
        )),
        Some(subfolder) => Ok(cache_folder.join(subfolder)),
        None => Ok(cache_folder.to_path_buf()),
    }
}

/// An executable stands for the folder it ships in.
fn resolve_source(path: &Path) -> PathBuf {
    let is_exe = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"));
    match path.parent() {
        Some(parent) if is_exe => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

fn run_cache_job(job: &CacheJob, cancel: &CancellationToken, progress: &ProgressHandle) -> BuildflowResult<CacheOutcome> {
    fs::create_dir_all(&job.cache_root).map_err(|err| FsError::io("cache.create_root", &job.cache_root, err))?;

    let stale_removed = job.clear_stale && job.cache_folder.exists();
    if stale_removed {
        warn!(
            path = %job.cache_folder.display(),
            config_index = job.config_index,
            "Deleting stale cache folder"
        );
        fs::remove_dir_all(&job.cache_folder)
            .map_err(|err| FsError::io("cache.remove_stale", &job.cache_folder, err))?;
    }
    fs::create_dir_all(&job.target).map_err(|err| FsError::io("cache.create_target", &job.target, err))?;

    let source = resolve_source(&job.source);
    let root = if source.is_dir() {
        source.clone()
    } else {
        source.parent().map(Path::to_path_buf).unwrap_or_default()
    };
    // Modifiers see paths relative to the cached folder, subfolder included.
    let subfolder = job.target.strip_prefix(&job.cache_folder).unwrap_or(Path::new(""));
    let ignore = |path: &Path| {
        let relative = subfolder.join(path.strip_prefix(&root).unwrap_or(path));
        job.modifiers
            .iter()
            .any(|modifier| modifier.ignore_file_during_cache(&relative, job.config_index))
    };
    let options = CopyOptions::new(job.policy)
        .with_ignore(&ignore)
        .with_cancel(cancel)
        .with_progress(progress);

    let stats = if source.is_dir() {
        copy_directory(&source, &job.target, &options)?
    } else if !source.is_file() {
        return Err(FsError::NotFound { path: source }.into());
    } else if job.auto_decompress && is_archive(&source) {
        extract_zip(&source, &job.target, &options)?
    } else {
        let mut stats = CopyStats::default();
        if ignore(&source) {
            stats.ignored += 1;
        } else {
            let file_name = source.file_name().unwrap_or_default();
            stats.record(copy_file(&source, &job.target.join(file_name), job.policy)?);
        }
        progress.set(1.0);
        stats
    };

    Ok(CacheOutcome {
        stale_removed,
        copied_from: source,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::list_files;
    use crate::modifiers::{ExcludeFilesModifier, ExcludeMode};

    #[test]
    fn test_exe_resolves_to_folder() {
        let exe = Path::new("/builds/win").join("Game.EXE");
        assert_eq!(resolve_source(&exe), PathBuf::from("/builds/win"));
        let zip = Path::new("/builds/win.zip");
        assert_eq!(resolve_source(zip), zip.to_path_buf());
    }

    #[test]
    fn test_cache_target_stays_inside_cache_folder() {
        let cache_folder = Path::new("/cache/guid");
        assert_eq!(cache_target(cache_folder, None).unwrap(), cache_folder);
        assert_eq!(
            cache_target(cache_folder, Some("Win".to_string())).unwrap(),
            cache_folder.join("Win")
        );

        let err = cache_target(cache_folder, Some("../../escaped".to_string())).unwrap_err();
        assert!(err.contains("'../../escaped' escapes the cache folder"));
        assert!(cache_target(cache_folder, Some("/tmp/escaped".to_string())).is_err());
    }

    #[test]
    fn test_ignore_sees_subfolder_prefixed_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("build");
        fs::create_dir_all(source.join("data")).unwrap();
        fs::write(source.join("game.exe"), "exe").unwrap();
        fs::write(source.join("game.pdb"), "pdb").unwrap();
        fs::write(source.join("data/level.pdb"), "pdb").unwrap();

        let cache_folder = dir.path().join("cache").join("guid");
        let modifier = ExcludeFilesModifier::new([r"^Win/.*\.pdb$"], ExcludeMode::IgnoreDuringCache);
        let job = CacheJob {
            source: source.clone(),
            cache_root: dir.path().join("cache"),
            cache_folder: cache_folder.clone(),
            target: cache_folder.join("Win"),
            clear_stale: true,
            auto_decompress: true,
            policy: DuplicateFileHandling::Error,
            config_index: 0,
            modifiers: vec![Arc::new(modifier)],
        };
        let outcome = run_cache_job(&job, &CancellationToken::new(), &ProgressHandle::new()).unwrap();

        assert_eq!(outcome.stats.ignored, 2);
        assert_eq!(list_files(&cache_folder).unwrap(), vec![cache_folder.join("Win/game.exe")]);
    }

    #[test]
    fn test_cache_job_clears_stale_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("build");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("game.exe"), "exe").unwrap();

        let cache_root = dir.path().join("cache");
        let cache_folder = cache_root.join("guid");
        fs::create_dir_all(&cache_folder).unwrap();
        fs::write(cache_folder.join("stale.txt"), "old").unwrap();

        let job = CacheJob {
            source: source.join("game.exe"),
            cache_root,
            cache_folder: cache_folder.clone(),
            target: cache_folder.clone(),
            clear_stale: true,
            auto_decompress: true,
            policy: DuplicateFileHandling::Error,
            config_index: 0,
            modifiers: Vec::new(),
        };
        let outcome = run_cache_job(&job, &CancellationToken::new(), &ProgressHandle::new()).unwrap();

        assert!(outcome.stale_removed);
        assert_eq!(outcome.copied_from, source);
        assert_eq!(outcome.stats.copied, 1);
        assert!(!cache_folder.join("stale.txt").exists());
        assert!(cache_folder.join("game.exe").exists());
    }
}
