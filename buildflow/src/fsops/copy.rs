//! File and directory copies with a duplicate-file policy.

use super::{FsError, FsResult};
use crate::cancellation::CancellationToken;
use crate::core::{DuplicateFileHandling, ProgressHandle};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Predicate deciding whether a source path is left out of a copy.
pub type IgnorePredicate<'a> = &'a (dyn Fn(&Path) -> bool + Send + Sync);

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The destination did not exist and was written.
    Copied,
    /// The destination existed and was replaced.
    Overwritten,
    /// The destination existed and was left untouched.
    Skipped,
}

/// Counters for a tree copy or extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Newly written files.
    pub copied: usize,
    /// Replaced files.
    pub overwritten: usize,
    /// Files left untouched because of the `Skip` policy.
    pub skipped: usize,
    /// Files or directories vetoed by the ignore predicate.
    pub ignored: usize,
}

impl CopyStats {
    pub(crate) fn record(&mut self, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Copied => self.copied += 1,
            CopyOutcome::Overwritten => self.overwritten += 1,
            CopyOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Files that ended up written to the destination.
    #[must_use]
    pub fn written(&self) -> usize {
        self.copied + self.overwritten
    }
}

/// Options shared by copy and extraction operations.
#[derive(Clone, Copy)]
pub struct CopyOptions<'a> {
    policy: DuplicateFileHandling,
    ignore: Option<IgnorePredicate<'a>>,
    cancel: Option<&'a CancellationToken>,
    progress: Option<&'a ProgressHandle>,
}

impl<'a> CopyOptions<'a> {
    /// Creates options with a duplicate-file policy and nothing else.
    #[must_use]
    pub fn new(policy: DuplicateFileHandling) -> Self {
        Self {
            policy,
            ignore: None,
            cancel: None,
            progress: None,
        }
    }

    /// Sets the ignore predicate.
    #[must_use]
    pub fn with_ignore(mut self, ignore: IgnorePredicate<'a>) -> Self {
        self.ignore = Some(ignore);
        self
    }

    /// Sets the cancellation token checked between files.
    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sets the handle receiving `files done / files total`.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The duplicate-file policy.
    #[must_use]
    pub fn policy(&self) -> DuplicateFileHandling {
        self.policy
    }

    pub(crate) fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.is_some_and(|ignore| ignore(path))
    }

    pub(crate) fn check_cancelled(&self) -> FsResult<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(FsError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn report(&self, done: usize, total: usize) {
        if let Some(progress) = self.progress {
            progress.set_ratio(done, total);
        }
    }
}

impl std::fmt::Debug for CopyOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOptions")
            .field("policy", &self.policy)
            .field("has_ignore", &self.ignore.is_some())
            .field("has_cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Resolves what to do when `destination` may already exist.
///
/// Returns `Ok(None)` when the file must be skipped.
pub(crate) fn resolve_duplicate(
    destination: &Path,
    policy: DuplicateFileHandling,
) -> FsResult<Option<CopyOutcome>> {
    if !destination.exists() {
        return Ok(Some(CopyOutcome::Copied));
    }
    match policy {
        DuplicateFileHandling::Overwrite => Ok(Some(CopyOutcome::Overwritten)),
        DuplicateFileHandling::Skip => Ok(None),
        DuplicateFileHandling::Error => Err(FsError::DuplicateFile {
            path: destination.to_path_buf(),
        }),
    }
}

/// Copies one file, creating parent directories as needed.
pub fn copy_file(source: &Path, destination: &Path, policy: DuplicateFileHandling) -> FsResult<CopyOutcome> {
    if !source.is_file() {
        return Err(FsError::NotFound {
            path: source.to_path_buf(),
        });
    }

    let Some(outcome) = resolve_duplicate(destination, policy)? else {
        return Ok(CopyOutcome::Skipped);
    };

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|source_err| FsError::io("copy_file.create_parent", parent, source_err))?;
    }
    fs::copy(source, destination)
        .map_err(|source_err| FsError::io("copy_file", destination, source_err))?;

    Ok(outcome)
}

/// Recursively copies the contents of `source` into `destination`.
///
/// Ignored directories are not descended into.
pub fn copy_directory(source: &Path, destination: &Path, options: &CopyOptions<'_>) -> FsResult<CopyStats> {
    if !source.is_dir() {
        return Err(FsError::NotFound {
            path: source.to_path_buf(),
        });
    }

    fs::create_dir_all(destination)
        .map_err(|source_err| FsError::io("copy_directory.create_dir", destination, source_err))?;

    let total = if options.progress.is_some() {
        count_files(source)
    } else {
        0
    };
    let mut stats = CopyStats::default();
    let mut done = 0;

    let mut walker = WalkDir::new(source).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        options.check_cancelled()?;
        let entry = entry.map_err(|source_err| FsError::walk(source, source_err))?;

        if options.is_ignored(entry.path()) {
            stats.ignored += 1;
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| FsError::NotFound {
                path: entry.path().to_path_buf(),
            })?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|source_err| FsError::io("copy_directory.create_dir", &target, source_err))?;
            continue;
        }

        let outcome = copy_file(entry.path(), &target, options.policy)?;
        stats.record(outcome);
        done += 1;
        options.report(done, total);
    }

    options.report(total, total);
    Ok(stats)
}

fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Lists every file under `root`, sorted.
pub fn list_files(root: &Path) -> FsResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source_err| FsError::walk(root, source_err))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Path of `path` relative to `base` with `/` separators.
#[must_use]
pub fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Deletes everything inside `dir`, keeping `dir` itself.
pub fn remove_dir_contents(dir: &Path) -> FsResult<()> {
    let entries = fs::read_dir(dir).map_err(|source_err| FsError::io("remove_dir_contents.read", dir, source_err))?;
    for entry in entries {
        let entry = entry.map_err(|source_err| FsError::io("remove_dir_contents.entry", dir, source_err))?;
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|source_err| FsError::io("remove_dir_contents.remove", &path, source_err))?;
    }
    Ok(())
}
