//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::{VersionerError, VersionerResult};

/// Recursively collect every regular file under `root`, sorted.
///
/// Symlinks are followed. A missing `root` is an error.
pub fn collect_files(root: &Path) -> VersionerResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            VersionerError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// List the immediate entries of `dir`, sorted.
pub fn list_dir(dir: &Path) -> VersionerResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| VersionerError::io(dir, e))? {
        let entry = entry.map_err(|e| VersionerError::io(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// `path` relative to `base`, with `/` separators.
pub fn relative_display(base: &Path, path: &Path) -> String {
    let relative = relative_path(base, path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
