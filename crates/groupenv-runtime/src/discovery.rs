//! Find loadable archives on disk.

use std::path::{Path, PathBuf};

use groupenv_core::config::LibraryConfig;
use groupenv_core::layout::absolutize;
use walkdir::{DirEntry, WalkDir};

use crate::context::has_extension;

/// Every archive under `dir`, recursively, as sorted absolute paths.
///
/// A missing directory yields an empty list. Hidden entries (and everything
/// below a hidden directory) and unreadable entries are skipped with a warning.
pub fn discover_archives(dir: &Path, extension: &str) -> Vec<PathBuf> {
    walk(dir, extension, None)
}

/// Archives directly inside `dir`, not descending into subdirectories.
pub fn list_archives(dir: &Path, extension: &str) -> Vec<PathBuf> {
    walk(dir, extension, Some(1))
}

/// Archives visible on the host application's own library path, sorted and
/// without duplicates.
///
/// Only used by export tooling; these never enter a group's loading context.
pub fn host_libraries(cfg: &LibraryConfig) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = cfg
        .host_library_path
        .iter()
        .flat_map(|dir| list_archives(dir, &cfg.archive_extension))
        .collect();
    found.sort();
    found.dedup();
    found
}

fn walk(dir: &Path, extension: &str, max_depth: Option<usize>) -> Vec<PathBuf> {
    let root = absolutize(dir);
    if !root.is_dir() {
        return Vec::new();
    }

    let mut walker = WalkDir::new(&root).follow_links(true);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut found = Vec::new();
    let entries = walker.into_iter().filter_entry(|e| {
        if e.depth() > 0 && is_hidden(e) {
            tracing::warn!(path = %e.path().display(), "Skipping hidden library entry");
            return false;
        }
        true
    });
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable library entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            tracing::debug!(archive = %entry.path().display(), "Found archive");
            found.push(entry.into_path());
        }
    }
    found.sort();
    found
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
