//! Recursive directory copy with a base-name exclusion set.
//!
//! This is the primitive both snapshot staging and restore replay are built on.
//! It assumes a bounded tree: symlinks are followed and a link cycle surfaces as
//! an I/O error.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Counters for a completed copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub bytes: u64,
}

/// Copy the contents of `source` into `destination`.
///
/// Any entry whose base name is listed in `exclude` is skipped together with
/// everything below it, at any depth. A missing `source` is a no-op. The first
/// I/O error aborts the copy and is returned; whatever was already written stays
/// in place.
pub fn copy_tree(source: &Path, destination: &Path, exclude: &[&str]) -> io::Result<CopyStats> {
    let mut stats = CopyStats::default();

    if !source.exists() {
        return Ok(stats);
    }

    fs::create_dir_all(destination)?;

    let walker = WalkDir::new(source)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry, exclude));

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            stats.bytes += fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

/// Copy a single file, creating the destination's parent directories.
/// A missing `source` is a no-op.
pub fn copy_file(source: &Path, destination: &Path) -> io::Result<CopyStats> {
    if !source.exists() {
        return Ok(CopyStats::default());
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(source, destination)?;
    Ok(CopyStats { files: 1, bytes })
}

fn is_excluded(entry: &DirEntry, exclude: &[&str]) -> bool {
    let name = entry.file_name().to_string_lossy();
    exclude.iter().any(|pattern| name == *pattern)
}
