//! Subdirectory discovery and input preflight.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, trace};

/// A subdirectory of the batch root eligible for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Directory name relative to the root.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Include entries whose name starts with `.`.
    pub include_hidden: bool,
}

/// List the immediate subdirectories of `root`, sorted by name.
///
/// Symlinks that resolve to directories are included. Names that are not valid
/// UTF-8 are skipped since they cannot be reported faithfully.
pub fn list_subdirectories(root: &Path, options: &DiscoverOptions) -> Result<Vec<Candidate>> {
    if !root.is_dir() {
        return Err(anyhow!("batch root is not a directory: {}", root.display()));
    }
    let mut candidates = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %path.display(), "skipping non-utf8 entry");
            continue;
        };
        if !options.include_hidden && name.starts_with('.') {
            trace!(name = %name, "skipping hidden entry");
            continue;
        }
        if !path.is_dir() {
            continue;
        }
        candidates.push(Candidate { name, path });
    }
    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = candidates.len(), "discovered subdirectories");
    Ok(candidates)
}

/// Return the required extensions for which `dir` holds no regular file.
pub fn missing_inputs(dir: &Path, required_extensions: &[String]) -> Result<Vec<String>> {
    if required_extensions.is_empty() {
        return Ok(Vec::new());
    }
    let mut present = vec![false; required_extensions.len()];
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        for (idx, ext) in required_extensions.iter().enumerate() {
            if has_extension(&name, ext) {
                present[idx] = true;
            }
        }
    }
    Ok(required_extensions
        .iter()
        .zip(present)
        .filter(|(_, found)| !found)
        .map(|(ext, _)| ext.trim_start_matches('.').to_string())
        .collect())
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|found| found.to_str())
        .is_some_and(|found| found == ext.trim_start_matches('.'))
}
