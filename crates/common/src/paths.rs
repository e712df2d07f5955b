//! Resource path lookup.
//!
//! A path is tried as given, then relative to the working directory, then
//! relative to the directory holding the executable. Lookups run on worker
//! threads, so nothing here reports; callers turn a miss into their own error.

use std::path::{Path, PathBuf};

/// Locations tried for `path`, in lookup order, without duplicates.
pub fn candidate_paths(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    if path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(path));
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(path));
        }
    }
    candidates.dedup();
    candidates
}

/// First existing location for `path`, or `None`.
pub fn resolve_path(path: &Path) -> Option<PathBuf> {
    candidate_paths(path).into_iter().find(|p| p.exists())
}
