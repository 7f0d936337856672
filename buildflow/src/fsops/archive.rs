//! Zip extraction and creation.

use super::copy::{resolve_duplicate, CopyOptions, CopyStats};
use super::{FsError, FsResult};
use std::fs::{self, File};
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File extensions treated as archives (lowercase, without the dot).
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip"];

/// Returns true if the path has an archive extension.
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

/// Extracts a zip archive into `target`, applying the duplicate-file policy per entry.
///
/// The ignore predicate receives each entry's path relative to the archive root.
pub fn extract_zip(archive_path: &Path, target: &Path, options: &CopyOptions<'_>) -> FsResult<CopyStats> {
    let file = File::open(archive_path)
        .map_err(|source_err| FsError::io("extract_zip.open", archive_path, source_err))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|source_err| FsError::zip("extract_zip.decode", archive_path, source_err))?;

    fs::create_dir_all(target)
        .map_err(|source_err| FsError::io("extract_zip.create_root", target, source_err))?;

    let total = archive.len();
    let mut stats = CopyStats::default();

    for index in 0..total {
        options.check_cancelled()?;
        let mut entry = archive
            .by_index(index)
            .map_err(|source_err| FsError::zip("extract_zip.read_entry", archive_path, source_err))?;
        let entry_path = sanitize_archive_path(archive_path, entry.name())?;
        if options.is_ignored(&entry_path) {
            stats.ignored += 1;
            options.report(index + 1, total);
            continue;
        }
        let destination = target.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|source_err| FsError::io("extract_zip.create_dir", &destination, source_err))?;
            options.report(index + 1, total);
            continue;
        }

        let Some(outcome) = resolve_duplicate(&destination, options.policy())? else {
            stats.skipped += 1;
            options.report(index + 1, total);
            continue;
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|source_err| FsError::io("extract_zip.create_parent", parent, source_err))?;
        }
        let mut output = File::create(&destination)
            .map_err(|source_err| FsError::io("extract_zip.create_file", &destination, source_err))?;
        io::copy(&mut entry, &mut output)
            .map_err(|source_err| FsError::io("extract_zip.copy", &destination, source_err))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode))
                .map_err(|source_err| FsError::io("extract_zip.set_permissions", &destination, source_err))?;
        }

        stats.record(outcome);
        options.report(index + 1, total);
    }

    Ok(stats)
}

fn sanitize_archive_path(archive: &Path, entry: &str) -> FsResult<PathBuf> {
    let invalid = || FsError::InvalidArchiveEntry {
        archive: archive.to_path_buf(),
        entry: entry.to_string(),
    };

    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(invalid());
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }

    Ok(sanitized)
}

/// Writes every file under `source` into a new deflated zip at `archive_path`.
///
/// Entry names are relative to `source` with `/` separators. The archive
/// itself is skipped if it lives inside `source`. Returns the number of files written.
pub fn zip_directory(source: &Path, archive_path: &Path, options: &CopyOptions<'_>) -> FsResult<usize> {
    if !source.is_dir() {
        return Err(FsError::NotFound {
            path: source.to_path_buf(),
        });
    }

    if resolve_duplicate(archive_path, options.policy())?.is_none() {
        return Ok(0);
    }

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source_err| FsError::io("zip_directory.create_parent", parent, source_err))?;
    }
    let file = File::create(archive_path)
        .map_err(|source_err| FsError::io("zip_directory.create", archive_path, source_err))?;
    let mut writer = ZipWriter::new(file);
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let files: Vec<PathBuf> = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.path() != archive_path)
        .filter(|entry| !options.is_ignored(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();

    let total = files.len();
    for (index, path) in files.iter().enumerate() {
        options.check_cancelled()?;
        let name = super::relative_slash_path(source, path);
        writer
            .start_file(name, file_options)
            .map_err(|source_err| FsError::zip("zip_directory.start_file", archive_path, source_err))?;
        let mut input =
            File::open(path).map_err(|source_err| FsError::io("zip_directory.open", path, source_err))?;
        io::copy(&mut input, &mut writer)
            .map_err(|source_err| FsError::io("zip_directory.write", archive_path, source_err))?;
        options.report(index + 1, total);
    }

    writer
        .finish()
        .map_err(|source_err| FsError::zip("zip_directory.finish", archive_path, source_err))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DuplicateFileHandling;
    use std::io::Write;
    use tempfile::TempDir;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, contents) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("build.zip")));
        assert!(is_archive(Path::new("BUILD.ZIP")));
        assert!(!is_archive(Path::new("build.exe")));
        assert!(!is_archive(Path::new("zip")));
    }

    #[test]
    fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("build.zip");
        build_zip(&archive, &[("game.exe", "exe"), ("data/level.bin", "level")]);

        let target = dir.path().join("out");
        let stats = extract_zip(&archive, &target, &CopyOptions::new(DuplicateFileHandling::Error)).unwrap();

        assert_eq!(stats.copied, 2);
        assert_eq!(fs::read_to_string(target.join("data/level.bin")).unwrap(), "level");
    }

    #[test]
    fn test_extract_zip_respects_skip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("build.zip");
        build_zip(&archive, &[("game.exe", "new")]);
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("game.exe"), "old").unwrap();

        let stats = extract_zip(&archive, &target, &CopyOptions::new(DuplicateFileHandling::Skip)).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(fs::read_to_string(target.join("game.exe")).unwrap(), "old");
    }

    #[test]
    fn test_extract_zip_ignores_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("build.zip");
        build_zip(&archive, &[("game.exe", "exe"), ("game.pdb", "pdb")]);

        let ignore = |path: &Path| path.extension().is_some_and(|ext| ext == "pdb");
        let options = CopyOptions::new(DuplicateFileHandling::Error).with_ignore(&ignore);
        let target = dir.path().join("out");
        let stats = extract_zip(&archive, &target, &options).unwrap();

        assert_eq!(stats.ignored, 1);
        assert!(target.join("game.exe").exists());
        assert!(!target.join("game.pdb").exists());
    }

    #[test]
    fn test_extract_zip_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(&archive, &[("../escape.txt", "x")]);

        let err = extract_zip(&archive, &dir.path().join("out"), &CopyOptions::new(DuplicateFileHandling::Overwrite))
            .unwrap_err();
        assert!(matches!(err, FsError::InvalidArchiveEntry { .. }));
    }

    #[test]
    fn test_zip_directory_then_extract() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("build");
        fs::create_dir_all(source.join("data")).unwrap();
        fs::write(source.join("game.exe"), "exe").unwrap();
        fs::write(source.join("data/a.bin"), "a").unwrap();

        let archive = dir.path().join("build.zip");
        let written = zip_directory(&source, &archive, &CopyOptions::new(DuplicateFileHandling::Error)).unwrap();
        assert_eq!(written, 2);

        let out = dir.path().join("out");
        extract_zip(&archive, &out, &CopyOptions::new(DuplicateFileHandling::Error)).unwrap();
        assert_eq!(fs::read_to_string(out.join("data/a.bin")).unwrap(), "a");
    }
}
