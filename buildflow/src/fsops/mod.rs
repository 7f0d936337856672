//! Blocking filesystem operations used by caching, modifiers and destinations.
//!
//! Every copy honors a [`DuplicateFileHandling`](crate::core::DuplicateFileHandling)
//! policy, an optional ignore predicate and an optional cancellation token.
//! Callers run these on `tokio::task::spawn_blocking`.

mod archive;
mod copy;
mod error;

pub use archive::{extract_zip, is_archive, zip_directory, ARCHIVE_EXTENSIONS};
pub use copy::{
    copy_directory, copy_file, list_files, relative_slash_path, remove_dir_contents, CopyOptions,
    CopyOutcome, CopyStats, IgnorePredicate,
};
pub use error::{FsError, FsResult};
