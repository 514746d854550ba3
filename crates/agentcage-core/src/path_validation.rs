//! Workspace path resolution.
//!
//! The sandbox facade resolves its workspace argument to an absolute,
//! canonical path once at construction time, so that the rest of the
//! pipeline (proxy, builders, driver) deal with an unambiguous root.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Resolve `path` (absolute or relative to the current directory) to a
/// canonical absolute path, failing if it doesn't exist or isn't a directory.
pub fn resolve_workspace(path: &str) -> Result<PathBuf> {
    let input = Path::new(path);
    let full = if input.is_absolute() {
        input.to_path_buf()
    } else {
        std::env::current_dir()?.join(input)
    };
    let canonical = full
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("invalid workspace path {}: {}", path, e))?;
    if !canonical.is_dir() {
        anyhow::bail!("workspace path is not a directory: {}", path);
    }
    Ok(canonical)
}
